//! Lifecycle events delivered by the host and their outcomes.

use std::fmt;
use std::str::FromStr;

use tokio::task::JoinHandle;

use crate::request::{Request, Response};
use crate::stats::{ActivationReport, FillStats};

/// A control message posted by a cooperating page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Activate a waiting worker version immediately.
    SkipWaiting,
    /// Cache every manifest resource not yet in the content store.
    DownloadOffline,
}

impl FromStr for Message {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skipWaiting" => Ok(Self::SkipWaiting),
            "downloadOffline" => Ok(Self::DownloadOffline),
            other => Err(format!("unknown message: {other}")),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkipWaiting => write!(f, "skipWaiting"),
            Self::DownloadOffline => write!(f, "downloadOffline"),
        }
    }
}

/// An event dispatched to the cache lifecycle.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A new worker version is being installed.
    Install,
    /// An installed worker version is taking over.
    Activate,
    /// A page issued a request.
    Fetch(Request),
    /// A page posted a message.
    Message(Message),
}

/// Where a response handed back to a page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Served from the content store.
    Cache,
    /// Fetched live by the cache lifecycle.
    Network,
    /// The lifecycle declined the request and the host fetched it directly.
    PassThrough,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Network => write!(f, "network"),
            Self::PassThrough => write!(f, "pass-through"),
        }
    }
}

/// Result of handling a fetch event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The request is not managed here; the host should handle it as usual.
    PassThrough,
    /// The lifecycle produced a response.
    Respond {
        /// Response for the page.
        response: Response,
        /// Origin of the response.
        source: ResponseSource,
    },
}

/// Terminal state of an activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Reconciliation completed.
    Success(ActivationReport),
    /// Reconciliation failed and every store was deleted.
    WipeAndReset {
        /// Description of the failure that triggered the wipe.
        reason: String,
    },
}

impl ActivationOutcome {
    /// Returns true for [`ActivationOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Result of dispatching a [`WorkerEvent`].
#[derive(Debug)]
pub enum EventOutcome {
    /// Install finished and the core set is staged.
    Installed(FillStats),
    /// Activation reached a terminal state.
    Activated(ActivationOutcome),
    /// Fetch handled.
    Fetched(FetchOutcome),
    /// Message handled, with the background task it started, if any.
    MessageHandled(Option<JoinHandle<()>>),
}
