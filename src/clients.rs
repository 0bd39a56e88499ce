//! Client control primitives exposed by the host.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Control over the pages (clients) a worker version serves.
///
/// Both methods have default no-op implementations for convenience.
pub trait ClientControl: Send + Sync {
    /// Marks the worker as eligible to activate without waiting for the
    /// previous version's clients to close.
    fn skip_waiting(&self) {}

    /// Takes control of all currently open clients.
    fn claim(&self) {}
}

/// A null implementation that ignores both signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClients;

impl ClientControl for NoClients {}

/// Records client control signals for the host.
#[derive(Debug, Default)]
pub struct ClientState {
    skip_waiting: AtomicBool,
    claimed: AtomicBool,
    claims: AtomicUsize,
}

impl ClientState {
    /// Creates a state with no signals recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once skip-waiting has been requested.
    #[must_use]
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// Returns true once clients have been claimed.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Returns how many times `claim` was called.
    #[must_use]
    pub fn claim_count(&self) -> usize {
        self.claims.load(Ordering::Relaxed)
    }

    /// Clears the skip-waiting flag, e.g. when a new version starts installing.
    pub fn reset_skip_waiting(&self) {
        self.skip_waiting.store(false, Ordering::Release);
    }
}

impl ClientControl for ClientState {
    fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Release);
    }

    fn claim(&self) {
        self.claims.fetch_add(1, Ordering::Relaxed);
        self.claimed.store(true, Ordering::Release);
    }
}
