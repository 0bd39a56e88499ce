//! Mapping between absolute request URLs and manifest resource paths.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static ORIGIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[A-Za-z0-9.\-]+(:[0-9]{1,5})?$").expect("valid regex")
});

/// Path of the root document in the resource manifest.
pub const ROOT_PATH: &str = "/";

/// Query marker used by the app for cache busting.
const VERSION_MARKER: &str = "?v=";

/// Validates an origin and strips any trailing slash.
///
/// # Errors
///
/// Returns [`Error::InvalidOrigin`] if the value is not `scheme://host[:port]`.
pub fn normalize_origin(origin: &str) -> Result<String> {
    let trimmed = origin.trim().trim_end_matches('/');
    if ORIGIN_RE.is_match(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(Error::InvalidOrigin(origin.to_string()))
    }
}

/// Returns the absolute URL for a manifest resource path.
#[must_use]
pub fn resource_url(origin: &str, path: &str) -> String {
    if path == ROOT_PATH {
        format!("{origin}/")
    } else {
        format!("{origin}/{}", path.trim_start_matches('/'))
    }
}

/// Returns the remainder of `url` after `origin` and its separating slash.
fn relative_to_origin<'a>(origin: &str, url: &'a str) -> Option<&'a str> {
    let rest = url.strip_prefix(origin)?;
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix('/')
}

/// Derives the manifest path of a URL already held in a store.
///
/// The empty path maps to `/`. Query strings are kept, so a cached
/// `main.js?v=2` never matches the manifest entry `main.js`.
#[must_use]
pub fn stored_key(origin: &str, url: &str) -> Option<String> {
    let rest = relative_to_origin(origin, url)?;
    if rest.is_empty() {
        Some(ROOT_PATH.to_string())
    } else {
        Some(rest.to_string())
    }
}

/// Derives the manifest path for an intercepted request URL.
///
/// Strips a `?v=` cache-busting suffix and maps the bare origin, fragment-only
/// paths and the empty path to `/`.
#[must_use]
pub fn request_key(origin: &str, url: &str) -> Option<String> {
    let rest = relative_to_origin(origin, url)?;
    let key = rest
        .find(VERSION_MARKER)
        .map_or(rest, |idx| &rest[..idx]);
    if key.is_empty() || rest.starts_with('#') {
        return Some(ROOT_PATH.to_string());
    }
    Some(key.to_string())
}
