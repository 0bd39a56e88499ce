//! Resource manifests produced by the web build.
//!
//! A [`ResourceManifest`] maps every servable path to a content fingerprint.
//! The [`AssetManifest`] pairs it with the core set: the paths that must be
//! present before the app can boot offline.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mapping from resource path to content fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceManifest(BTreeMap<String, String>);

impl ResourceManifest {
    /// Creates an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a manifest from `(path, fingerprint)` pairs.
    #[must_use]
    pub fn from_pairs<P, F>(pairs: impl IntoIterator<Item = (P, F)>) -> Self
    where
        P: Into<String>,
        F: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(p, f)| (p.into(), f.into()))
                .collect(),
        )
    }

    /// Returns the fingerprint for a path.
    #[must_use]
    pub fn fingerprint(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    /// Returns true if the path is listed.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    /// Iterates over all listed paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns the number of listed resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no resources are listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `path` is listed here with the same fingerprint as in `previous`.
    #[must_use]
    pub fn is_unchanged(&self, previous: &Self, path: &str) -> bool {
        match (self.fingerprint(path), previous.fingerprint(path)) {
            (Some(current), Some(old)) => current == old,
            _ => false,
        }
    }

    /// Serializes the manifest as the JSON record kept in the manifest store.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON encoding fails.
    pub fn to_record(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses a JSON record previously written by [`to_record`](Self::to_record).
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a JSON object of strings.
    pub fn from_record(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// A build's resource manifest together with its core set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    /// All servable resources.
    pub resources: ResourceManifest,
    /// Paths pre-fetched during install, in fetch order.
    #[serde(default)]
    pub core: Vec<String>,
}

impl AssetManifest {
    /// Creates and validates an asset manifest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManifestInvalid`] if a core path is not a resource.
    pub fn new(resources: ResourceManifest, core: Vec<String>) -> Result<Self> {
        let manifest = Self { resources, core };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks that every core path is listed in the resource manifest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManifestInvalid`] naming the first unlisted core path.
    pub fn validate(&self) -> Result<()> {
        if let Some(missing) = self.core.iter().find(|p| !self.resources.contains(p)) {
            return Err(Error::ManifestInvalid(format!(
                "core path '{missing}' is not listed in resources"
            )));
        }
        Ok(())
    }

    /// Loads an asset manifest from a `.json` or `.toml` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let manifest: Self = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&contents)?
        } else {
            serde_json::from_str(&contents)?
        };
        manifest.validate()?;
        log::debug!(
            "Loaded asset manifest from {}: {} resources, {} core",
            path.display(),
            manifest.resources.len(),
            manifest.core.len()
        );
        Ok(manifest)
    }
}
