//! Error types for the shellcache library.

use thiserror::Error;

/// Errors that can occur during cache lifecycle operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The network could not be reached for a request.
    #[error("Network error fetching {url}: {reason}")]
    Network {
        /// Absolute URL of the failed request.
        url: String,
        /// Transport-level failure description.
        reason: String,
    },

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A bulk fill received a response that was not ok.
    #[error("Request for {url} returned status {status}")]
    BadStatus {
        /// Absolute URL of the request.
        url: String,
        /// HTTP status code received.
        status: u16,
    },

    /// The asset manifest is malformed or inconsistent.
    #[error("Invalid asset manifest: {0}")]
    ManifestInvalid(String),

    /// No asset manifest was configured.
    #[error("No asset manifest configured (use --manifest or set `manifest` in config)")]
    ManifestMissing,

    /// A cache store backend failed.
    #[error("Cache store '{store}' failed: {reason}")]
    Store {
        /// Name of the store.
        store: String,
        /// Failure description.
        reason: String,
    },

    /// The configured origin is not an absolute `http(s)` origin.
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    /// A lifecycle step was requested in the wrong worker state.
    #[error("Invalid worker state: {0}")]
    InvalidState(String),

    /// A background operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error during store or config operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration could not be parsed.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Error {
    /// Creates a network error for the given URL.
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a store error for the named store.
    pub fn store(store: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Store {
            store: store.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error means the network was unreachable.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Http(_))
    }
}

/// A specialized `Result` type for shellcache operations.
pub type Result<T> = std::result::Result<T, Error>;
