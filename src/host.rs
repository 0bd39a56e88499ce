//! Host-side dispatcher for one worker version.
//!
//! The host plays the platform's role: it runs install and activation in
//! order, retries failed installs, decides whether a request reaches the
//! lifecycle at all, and performs pass-through fetches itself.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::clients::{ClientControl, ClientState};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::event::{ActivationOutcome, FetchOutcome, Message, ResponseSource};
use crate::lifecycle::CacheLifecycle;
use crate::manifest::AssetManifest;
use crate::network::{HttpNetwork, Network};
use crate::request::{Request, Response};
use crate::stats::FillStats;
use crate::store::{CacheStorage, DiskCacheStorage};

/// Lifecycle state of a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, not yet installed.
    Parsed,
    /// Install in progress.
    Installing,
    /// Installed and waiting to activate.
    Installed,
    /// Activation in progress.
    Activating,
    /// Active and handling fetches.
    Activated,
    /// Failed to install or shut down.
    Redundant,
}

impl WorkerState {
    /// Returns true if fetches are routed through the lifecycle.
    #[must_use]
    pub const fn can_intercept_fetch(self) -> bool {
        matches!(self, Self::Activated)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsed => write!(f, "parsed"),
            Self::Installing => write!(f, "installing"),
            Self::Installed => write!(f, "installed"),
            Self::Activating => write!(f, "activating"),
            Self::Activated => write!(f, "activated"),
            Self::Redundant => write!(f, "redundant"),
        }
    }
}

/// Runs one worker version against a store collection and a network.
pub struct WorkerHost<S: CacheStorage = DiskCacheStorage, N: Network = HttpNetwork> {
    lifecycle: Arc<CacheLifecycle<S, N>>,
    clients: Arc<ClientState>,
    state: Mutex<WorkerState>,
}

impl<S, N> WorkerHost<S, N>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    /// Creates a host for the given build.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or manifest is invalid.
    pub fn new(config: WorkerConfig, manifest: AssetManifest, caches: S, network: N) -> Result<Self> {
        let clients = Arc::new(ClientState::new());
        let control: Arc<dyn ClientControl> = clients.clone();
        let lifecycle = CacheLifecycle::new(config, manifest, caches, network, control)?;
        Ok(Self {
            lifecycle: Arc::new(lifecycle),
            clients,
            state: Mutex::new(WorkerState::Parsed),
        })
    }

    /// Returns the lifecycle driven by this host.
    #[must_use]
    pub const fn lifecycle(&self) -> &Arc<CacheLifecycle<S, N>> {
        &self.lifecycle
    }

    /// Returns the recorded client control signals.
    #[must_use]
    pub fn clients(&self) -> &ClientState {
        &self.clients
    }

    /// Returns the current worker state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_state(&self, state: WorkerState) {
        log::debug!("Worker state: {state}");
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = state;
    }

    fn expect_state(&self, expected: &[WorkerState], action: &str) -> Result<()> {
        let current = self.state();
        if expected.contains(&current) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("cannot {action} while {current}")))
        }
    }

    /// Installs the worker, retrying as configured.
    ///
    /// # Errors
    ///
    /// Returns the last install error once all attempts fail; the worker
    /// becomes [`WorkerState::Redundant`].
    pub async fn install(&self) -> Result<FillStats> {
        self.expect_state(&[WorkerState::Parsed, WorkerState::Redundant], "install")?;
        self.set_state(WorkerState::Installing);
        self.clients.reset_skip_waiting();

        let config = self.lifecycle.config();
        let attempts = config.install_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.lifecycle.install().await {
                Ok(stats) => {
                    self.set_state(WorkerState::Installed);
                    return Ok(stats);
                }
                Err(e) if attempt < attempts => {
                    log::warn!("Install attempt {attempt}/{attempts} failed: {e}");
                    attempt += 1;
                    tokio::time::sleep(config.install_retry_delay()).await;
                }
                Err(e) => {
                    log::error!("Install failed after {attempts} attempt(s): {e}");
                    self.set_state(WorkerState::Redundant);
                    return Err(e);
                }
            }
        }
    }

    /// Activates an installed worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the worker is installed.
    pub async fn activate(&self) -> Result<ActivationOutcome> {
        self.expect_state(&[WorkerState::Installed], "activate")?;
        self.set_state(WorkerState::Activating);
        let outcome = self.lifecycle.activate().await;
        // A wiped worker still takes control; fetches repopulate from the network.
        self.set_state(WorkerState::Activated);
        Ok(outcome)
    }

    /// Installs, then activates right away if the worker asked to skip waiting.
    ///
    /// Returns the activation outcome, or `None` if the worker is left waiting.
    ///
    /// # Errors
    ///
    /// Returns the install error if every attempt fails.
    pub async fn start(&self) -> Result<Option<ActivationOutcome>> {
        self.install().await?;
        if self.clients.skip_waiting_requested() {
            return self.activate().await.map(Some);
        }
        log::info!("Worker installed and waiting");
        Ok(None)
    }

    /// Marks the worker active without reinstalling if the stores already
    /// hold this version's manifest.
    ///
    /// Returns true if the worker was attached. A manifest record that
    /// cannot be parsed or read back from its store counts as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest store cannot be opened.
    pub async fn attach(&self) -> Result<bool> {
        let current = &self.lifecycle.manifest().resources;
        match self.lifecycle.persisted_manifest().await {
            Ok(Some(recorded)) if &recorded == current => {
                self.set_state(WorkerState::Activated);
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(e @ (Error::Json(_) | Error::Store { .. })) => {
                log::warn!("Ignoring unreadable manifest record: {e}");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Handles a page request, resolving pass-through via the network.
    ///
    /// # Errors
    ///
    /// Returns the network error when no response can be produced.
    pub async fn fetch(&self, request: &Request) -> Result<(Response, ResponseSource)> {
        if self.state().can_intercept_fetch()
            && let FetchOutcome::Respond { response, source } = self.lifecycle.fetch(request).await?
        {
            return Ok((response, source));
        }
        let response = self.lifecycle.network().fetch(request).await?;
        Ok((response, ResponseSource::PassThrough))
    }

    /// Posts a message payload to the worker.
    ///
    /// Unknown payloads are ignored. A `skipWaiting` message activates a
    /// waiting worker. Returns the background task started, if any.
    ///
    /// # Errors
    ///
    /// Returns an error only if activation triggered by the message fails
    /// to start.
    pub async fn post_message(&self, payload: &str) -> Result<Option<JoinHandle<()>>> {
        let message: Message = match payload.trim().parse() {
            Ok(message) => message,
            Err(e) => {
                log::debug!("Ignoring message: {e}");
                return Ok(None);
            }
        };
        log::info!("Received message {message}");

        let handle = self.lifecycle.handle_message(message);
        if message == Message::SkipWaiting && self.state() == WorkerState::Installed {
            self.activate().await?;
        }
        Ok(handle)
    }

    /// Cancels background work and retires the worker.
    pub fn shutdown(&self) {
        self.lifecycle.shutdown();
        self.set_state(WorkerState::Redundant);
    }
}
