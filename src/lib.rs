//! shellcache - offline cache lifecycle for single-page web apps.
//!
//! Keeps a web app's assets available offline across deployments. Each
//! build ships an asset manifest (resource path to content fingerprint) and
//! a core set of files needed to boot. A worker version stages the core set
//! on install, reconciles the durable content store against the previous
//! build's manifest on activation, and answers page requests cache-first,
//! except the root document which is fetched online-first.
//!
//! The host environment is abstracted behind three seams: [`CacheStorage`]
//! for named stores, [`Network`] for fetching, and [`ClientControl`] for
//! claiming pages.
//!
//! # Example
//!
//! ```no_run
//! use shellcache::{AssetManifest, DiskCacheStorage, HttpNetwork, WorkerConfig, WorkerHost};
//!
//! # async fn example() -> shellcache::Result<()> {
//! let manifest = AssetManifest::load("build/assets.json".as_ref())?;
//! let config = WorkerConfig::new().with_origin("https://app.example.com");
//! let caches = DiskCacheStorage::new("/var/cache/app");
//!
//! let host = WorkerHost::new(config, manifest, caches, HttpNetwork::new()?)?;
//! host.start().await?;
//!
//! let (response, source) = host
//!     .fetch(&shellcache::Request::get("https://app.example.com/main.dart.js"))
//!     .await?;
//! println!("{} from {source}", response.status);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod clients;
pub mod config;
pub mod error;
pub mod event;
pub mod fill;
pub mod host;
pub mod lifecycle;
pub mod manifest;
pub mod network;
pub mod request;
pub mod stats;
pub mod store;
pub mod url;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "server")]
pub mod server;

// Re-export main types for convenience
pub use clients::{ClientControl, ClientState, NoClients};
pub use config::{AppConfig, PathConfig, ServerConfig, WorkerConfig};
pub use error::{Error, Result};
pub use event::{
    ActivationOutcome, EventOutcome, FetchOutcome, Message, ResponseSource, WorkerEvent,
};
pub use fill::{FillProgress, NoProgress, add_all, add_all_with_stats};
pub use host::{WorkerHost, WorkerState};
pub use lifecycle::CacheLifecycle;
pub use manifest::{AssetManifest, ResourceManifest};
pub use network::{HttpNetwork, Network};
pub use request::{CacheMode, Request, Response};
pub use stats::{ActivationReport, FillStats, FillStatsBuilder};
pub use store::{CacheStorage, DiskCacheStorage, MemoryCacheStorage, Store};
