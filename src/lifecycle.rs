//! The cache lifecycle: install, activate, fetch and message handling.
//!
//! Three named stores are involved:
//!
//! - the content store, serving the app's assets;
//! - the temp store, staging the core set between install and activation;
//! - the manifest store, holding the manifest of the last successful
//!   activation so the next version can tell which entries are still valid.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clients::ClientControl;
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::event::{
    ActivationOutcome, EventOutcome, FetchOutcome, Message, ResponseSource, WorkerEvent,
};
use crate::fill::{FillProgress, NoProgress, add_all, add_all_with_stats};
use crate::manifest::{AssetManifest, ResourceManifest};
use crate::network::{HttpNetwork, Network};
use crate::request::{CacheMode, Request, Response};
use crate::stats::{ActivationReport, FillStats, FillStatsBuilder};
use crate::store::{CacheStorage, DiskCacheStorage, Store, copy_entries};
use crate::url::{ROOT_PATH, request_key, resource_url, stored_key};

/// Key of the single entry in the manifest store, relative to the origin.
const MANIFEST_RECORD_KEY: &str = "manifest";

/// Cache lifecycle for one worker version.
///
/// Holds no mutable state of its own beyond the cancellation token for
/// background work; everything durable lives in the stores. The token is
/// renewed when a shut-down lifecycle is installed again.
pub struct CacheLifecycle<S: CacheStorage = DiskCacheStorage, N: Network = HttpNetwork> {
    config: WorkerConfig,
    manifest: AssetManifest,
    caches: S,
    network: N,
    clients: Arc<dyn ClientControl>,
    background: Mutex<CancellationToken>,
}

impl<S: CacheStorage, N: Network> CacheLifecycle<S, N> {
    /// Creates a lifecycle for the given build.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin is invalid or the core set lists a
    /// path missing from the resource manifest.
    pub fn new(
        config: WorkerConfig,
        manifest: AssetManifest,
        caches: S,
        network: N,
        clients: Arc<dyn ClientControl>,
    ) -> Result<Self> {
        manifest.validate()?;
        Ok(Self {
            config: config.normalized()?,
            manifest,
            caches,
            network,
            clients,
            background: Mutex::new(CancellationToken::new()),
        })
    }

    /// Returns the worker configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Returns the asset manifest of this version.
    #[must_use]
    pub const fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }

    /// Returns the store collection.
    #[must_use]
    pub const fn caches(&self) -> &S {
        &self.caches
    }

    /// Returns the network.
    #[must_use]
    pub const fn network(&self) -> &N {
        &self.network
    }

    fn origin(&self) -> &str {
        &self.config.origin
    }

    fn record_request(&self) -> Request {
        Request::get(resource_url(self.origin(), MANIFEST_RECORD_KEY))
    }

    /// Stages the core set in the temp store.
    ///
    /// Signals skip-waiting first, so the version activates as soon as it
    /// is installed.
    ///
    /// # Errors
    ///
    /// Returns an error if any core resource cannot be fetched or is not ok.
    /// Nothing is staged in that case.
    pub async fn install(&self) -> Result<FillStats> {
        self.renew_background();
        self.clients.skip_waiting();

        let temp = self.caches.open(&self.config.temp_cache).await?;
        let requests: Vec<Request> = self
            .manifest
            .core
            .iter()
            .map(|path| {
                Request::get(resource_url(self.origin(), path)).with_cache_mode(CacheMode::Reload)
            })
            .collect();

        let stats = add_all(
            &temp,
            &self.network,
            &requests,
            self.config.offline_concurrency,
            &NoProgress,
        )
        .await?;
        log::info!("Installed {} core resources", stats.resources_stored);
        Ok(stats)
    }

    /// Reconciles the stores with this version's manifest.
    ///
    /// Never fails: any error during reconciliation deletes all three stores
    /// and yields [`ActivationOutcome::WipeAndReset`].
    pub async fn activate(&self) -> ActivationOutcome {
        match self.reconcile().await {
            Ok(report) => {
                log::info!("Activated: {}", report.summary());
                ActivationOutcome::Success(report)
            }
            Err(e) => {
                log::error!("Failed to upgrade cache, wiping all stores: {e}");
                self.wipe().await;
                ActivationOutcome::WipeAndReset {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn reconcile(&self) -> Result<ActivationReport> {
        let content_name = &self.config.content_cache;
        let mut content = self.caches.open(content_name).await?;
        let temp = self.caches.open(&self.config.temp_cache).await?;
        let manifest_store = self.caches.open(&self.config.manifest_cache).await?;
        let record_request = self.record_request();
        let resources = &self.manifest.resources;

        let mut report = ActivationReport::default();
        match manifest_store.lookup(&record_request).await? {
            None => {
                report.first_activation = true;
                self.caches.delete(content_name).await?;
                content = self.caches.open(content_name).await?;
            }
            Some(record) => {
                let previous = ResourceManifest::from_record(&record.body)?;
                for request in content.keys().await? {
                    match stored_key(self.origin(), &request.url) {
                        Some(key) if resources.is_unchanged(&previous, &key) => {
                            report.retained.push(key);
                        }
                        key => {
                            content.delete(&request).await?;
                            report.evicted.push(key.unwrap_or(request.url));
                        }
                    }
                }
            }
        }

        // Freshly installed core files win over anything retained above.
        report.promoted = copy_entries(&temp, &content).await?;
        self.caches.delete(&self.config.temp_cache).await?;

        let record = Response::new(200, resources.to_record()?)
            .with_header("content-type", "application/json");
        manifest_store.put(&record_request, &record).await?;

        self.clients.claim();
        Ok(report)
    }

    /// Deletes all three stores, logging rather than returning failures.
    pub async fn wipe(&self) {
        for name in self.config.cache_names() {
            if let Err(e) = self.caches.delete(name).await {
                log::warn!("Failed to delete store {name}: {e}");
            }
        }
    }

    /// Returns the manifest recorded by the last successful activation.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the record is corrupt.
    pub async fn persisted_manifest(&self) -> Result<Option<ResourceManifest>> {
        let store = self.caches.open(&self.config.manifest_cache).await?;
        match store.lookup(&self.record_request()).await? {
            Some(record) => Ok(Some(ResourceManifest::from_record(&record.body)?)),
            None => Ok(None),
        }
    }

    /// Handles a request from a controlled page.
    ///
    /// # Errors
    ///
    /// Returns the network error for a cache miss that cannot be fetched,
    /// or for the root document when it is neither reachable nor cached.
    pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome> {
        if !request.is_get() {
            return Ok(FetchOutcome::PassThrough);
        }
        let Some(key) = request_key(self.origin(), &request.url) else {
            return Ok(FetchOutcome::PassThrough);
        };
        if !self.manifest.resources.contains(&key) {
            log::debug!("Not a managed resource: {}", request.url);
            return Ok(FetchOutcome::PassThrough);
        }
        if key == ROOT_PATH {
            return self.online_first(request).await;
        }

        let content = self.caches.open(&self.config.content_cache).await?;
        if let Some(response) = content.lookup(request).await? {
            log::debug!("Cache hit: {}", request.url);
            return Ok(FetchOutcome::Respond {
                response,
                source: ResponseSource::Cache,
            });
        }

        // Concurrent misses for the same URL may both land here; the last
        // put wins.
        let response = self.network.fetch(request).await?;
        if response.is_ok() {
            if let Err(e) = content.put(request, &response).await {
                log::warn!("Failed to cache {}: {e}", request.url);
            }
        }
        Ok(FetchOutcome::Respond {
            response,
            source: ResponseSource::Network,
        })
    }

    /// Serves the root document from the network, falling back to the cache.
    async fn online_first(&self, request: &Request) -> Result<FetchOutcome> {
        match self.network.fetch(request).await {
            Ok(response) => {
                match self.caches.open(&self.config.content_cache).await {
                    Ok(content) => {
                        if let Err(e) = content.put(request, &response).await {
                            log::warn!("Failed to cache {}: {e}", request.url);
                        }
                    }
                    Err(e) => log::warn!("Failed to open content store: {e}"),
                }
                Ok(FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(network_err) => {
                log::debug!("Offline, trying cache for {}: {network_err}", request.url);
                let content = self.caches.open(&self.config.content_cache).await?;
                match content.lookup(request).await? {
                    Some(response) => Ok(FetchOutcome::Respond {
                        response,
                        source: ResponseSource::Cache,
                    }),
                    None => Err(network_err),
                }
            }
        }
    }

    /// Returns the manifest paths that have no entry in the content store.
    ///
    /// # Errors
    ///
    /// Returns an error if the content store cannot be read.
    pub async fn missing_resources(&self) -> Result<Vec<String>> {
        let content = self.caches.open(&self.config.content_cache).await?;
        let present: HashSet<String> = content
            .keys()
            .await?
            .iter()
            .filter_map(|request| stored_key(self.origin(), &request.url))
            .collect();
        Ok(self
            .manifest
            .resources
            .paths()
            .filter(|path| !present.contains(*path))
            .map(str::to_string)
            .collect())
    }

    /// Fetches every missing manifest resource into the content store.
    ///
    /// # Errors
    ///
    /// Returns an error if any missing resource cannot be fetched; nothing
    /// is stored in that case. Returns [`Error::Cancelled`] if the lifecycle
    /// is shut down first.
    pub async fn download_offline(&self, progress: &dyn FillProgress) -> Result<FillStats> {
        let token = self.background_token();
        tokio::select! {
            biased;
            () = token.cancelled() => Err(Error::Cancelled),
            result = self.fill_missing(progress) => result,
        }
    }

    async fn fill_missing(&self, progress: &dyn FillProgress) -> Result<FillStats> {
        let missing = self.missing_resources().await?;
        let requests: Vec<Request> = missing
            .iter()
            .map(|path| Request::get(resource_url(self.origin(), path)))
            .collect();

        let mut builder = FillStatsBuilder::new();
        builder.set_skipped(self.manifest.resources.len() - missing.len());

        let content = self.caches.open(&self.config.content_cache).await?;
        add_all_with_stats(
            &content,
            &self.network,
            &requests,
            self.config.offline_concurrency,
            progress,
            builder,
        )
        .await
    }

    /// Cancels background work started by messages.
    pub fn shutdown(&self) {
        self.background_token().cancel();
    }

    fn background_token(&self) -> CancellationToken {
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn renew_background(&self) {
        let mut token = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }
}

impl<S, N> CacheLifecycle<S, N>
where
    S: CacheStorage + 'static,
    N: Network + 'static,
{
    /// Handles a control message.
    ///
    /// `DownloadOffline` runs in a background task whose handle is returned;
    /// its failures are logged and otherwise dropped.
    pub fn handle_message(self: &Arc<Self>, message: Message) -> Option<JoinHandle<()>> {
        match message {
            Message::SkipWaiting => {
                self.clients.skip_waiting();
                None
            }
            Message::DownloadOffline => {
                let lifecycle = Arc::clone(self);
                Some(tokio::spawn(async move {
                    match lifecycle.download_offline(&NoProgress).await {
                        Ok(stats) => log::info!(
                            "Offline download stored {} resources",
                            stats.resources_stored
                        ),
                        Err(Error::Cancelled) => log::debug!("Offline download cancelled"),
                        Err(e) => log::warn!("Offline download failed: {e}"),
                    }
                }))
            }
        }
    }

    /// Dispatches a lifecycle event to its handler.
    ///
    /// # Errors
    ///
    /// Returns install and fetch errors. Activation and messages never fail.
    pub async fn dispatch(self: &Arc<Self>, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::Install => Ok(EventOutcome::Installed(self.install().await?)),
            WorkerEvent::Activate => Ok(EventOutcome::Activated(self.activate().await)),
            WorkerEvent::Fetch(request) => Ok(EventOutcome::Fetched(self.fetch(&request).await?)),
            WorkerEvent::Message(message) => {
                Ok(EventOutcome::MessageHandled(self.handle_message(message)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ClientState;
    use crate::store::{MemoryCacheStorage, MemoryStore};
    use reqwest::Method;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    const ORIGIN: &str = "https://app.test";

    /// A mock network serving canned bodies, with an offline switch and a
    /// log of every URL fetched.
    #[derive(Default)]
    struct MockNetwork {
        responses: Mutex<HashMap<String, Response>>,
        offline: AtomicBool,
        log: Mutex<Vec<String>>,
    }

    impl MockNetwork {
        fn serve(&self, path: &str, status: u16, body: &str) {
            self.responses
                .lock()
                .unwrap()
                .insert(resource_url(ORIGIN, path), Response::new(status, body.to_string()));
        }

        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::Relaxed);
        }

        fn fetched(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn clear_log(&self) {
            self.log.lock().unwrap().clear();
        }
    }

    #[async_trait::async_trait]
    impl Network for Arc<MockNetwork> {
        async fn fetch(&self, request: &Request) -> Result<Response> {
            if self.offline.load(Ordering::Relaxed) {
                return Err(Error::network(&request.url, "offline"));
            }
            self.log.lock().unwrap().push(request.url.clone());
            self.responses
                .lock()
                .unwrap()
                .get(&request.url)
                .cloned()
                .ok_or_else(|| Error::network(&request.url, "connection refused"))
        }
    }

    struct Harness {
        caches: MemoryCacheStorage,
        network: Arc<MockNetwork>,
        clients: Arc<ClientState>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                caches: MemoryCacheStorage::new(),
                network: Arc::new(MockNetwork::default()),
                clients: Arc::new(ClientState::new()),
            }
        }

        fn lifecycle(
            &self,
            resources: &[(&str, &str)],
            core: &[&str],
        ) -> Arc<CacheLifecycle<MemoryCacheStorage, Arc<MockNetwork>>> {
            let manifest = AssetManifest::new(
                ResourceManifest::from_pairs(resources.iter().copied()),
                core.iter().map(|s| (*s).to_string()).collect(),
            )
            .unwrap();
            let config = WorkerConfig::new().with_origin(ORIGIN);
            let clients: Arc<dyn ClientControl> = self.clients.clone();
            Arc::new(
                CacheLifecycle::new(
                    config,
                    manifest,
                    self.caches.clone(),
                    Arc::clone(&self.network),
                    clients,
                )
                .unwrap(),
            )
        }

        async fn store(&self, name: &str) -> MemoryStore {
            self.caches.open(name).await.unwrap()
        }

        async fn content_paths(&self) -> Vec<String> {
            self.store("app-cache")
                .await
                .keys()
                .await
                .unwrap()
                .iter()
                .filter_map(|r| stored_key(ORIGIN, &r.url))
                .collect()
        }

        async fn seed(&self, store: &str, path: &str, body: &str) {
            self.store(store)
                .await
                .put(
                    &Request::get(resource_url(ORIGIN, path)),
                    &Response::new(200, body.to_string()),
                )
                .await
                .unwrap();
        }

        async fn seed_record(&self, pairs: &[(&str, &str)]) {
            let record = ResourceManifest::from_pairs(pairs.iter().copied())
                .to_record()
                .unwrap();
            self.store("app-manifest")
                .await
                .put(
                    &Request::get(resource_url(ORIGIN, MANIFEST_RECORD_KEY)),
                    &Response::new(200, record),
                )
                .await
                .unwrap();
        }

        async fn body(&self, store: &str, path: &str) -> Option<String> {
            self.store(store)
                .await
                .lookup(&Request::get(resource_url(ORIGIN, path)))
                .await
                .unwrap()
                .map(|r| String::from_utf8(r.body.to_vec()).unwrap())
        }
    }

    fn get(path: &str) -> Request {
        Request::get(resource_url(ORIGIN, path))
    }

    fn respond(outcome: FetchOutcome) -> (String, ResponseSource) {
        match outcome {
            FetchOutcome::Respond { response, source } => {
                (String::from_utf8(response.body.to_vec()).unwrap(), source)
            }
            FetchOutcome::PassThrough => panic!("expected a response"),
        }
    }

    // =========================================================================
    // install
    // =========================================================================

    #[tokio::test]
    async fn install_stages_core_set_with_reload() {
        let h = Harness::new();
        h.network.serve("index.html", 200, "<html>");
        h.network.serve("main.js", 200, "main");
        let lc = h.lifecycle(
            &[("index.html", "h1"), ("main.js", "h2"), ("extra.png", "h3")],
            &["index.html", "main.js"],
        );

        let stats = lc.install().await.unwrap();
        assert_eq!(stats.resources_stored, 2);
        assert!(h.clients.skip_waiting_requested());
        assert_eq!(h.store("app-temp-cache").await.len().unwrap(), 2);
        assert_eq!(h.store("app-cache").await.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn install_failure_stages_nothing() {
        let h = Harness::new();
        h.network.serve("index.html", 200, "<html>");
        let lc = h.lifecycle(
            &[("index.html", "h1"), ("main.js", "h2")],
            &["index.html", "main.js"],
        );

        assert!(lc.install().await.unwrap_err().is_network());
        assert_eq!(h.store("app-temp-cache").await.len().unwrap(), 0);
    }

    // =========================================================================
    // activate
    // =========================================================================

    #[tokio::test]
    async fn first_activation_replaces_content() {
        let h = Harness::new();
        h.seed("app-cache", "stale.js", "old").await;
        h.seed("app-temp-cache", "index.html", "<html>").await;
        let lc = h.lifecycle(&[("index.html", "h1"), ("stale.js", "h2")], &["index.html"]);

        let ActivationOutcome::Success(report) = lc.activate().await else {
            panic!("activation failed");
        };
        assert!(report.first_activation);
        assert_eq!(h.content_paths().await, vec!["index.html".to_string()]);
        assert!(!h.caches.has("app-temp-cache").await.unwrap());
        assert_eq!(
            lc.persisted_manifest().await.unwrap().as_ref(),
            Some(&lc.manifest().resources)
        );
        assert!(h.clients.is_claimed());
    }

    #[tokio::test]
    async fn upgrade_scenario_evicts_changed_and_overwrites_core() {
        let h = Harness::new();
        h.seed_record(&[("a.js", "hash0"), ("index.html", "hash2")]).await;
        h.seed("app-cache", "a.js", "old a").await;
        h.seed("app-cache", "index.html", "old index").await;
        h.seed("app-temp-cache", "index.html", "new index").await;
        let lc = h.lifecycle(&[("a.js", "hash1"), ("index.html", "hash2")], &["index.html"]);

        let ActivationOutcome::Success(report) = lc.activate().await else {
            panic!("activation failed");
        };
        assert!(!report.first_activation);
        assert_eq!(report.evicted, vec!["a.js".to_string()]);
        assert_eq!(report.retained, vec!["index.html".to_string()]);
        assert_eq!(h.content_paths().await, vec!["index.html".to_string()]);
        assert_eq!(h.body("app-cache", "index.html").await.as_deref(), Some("new index"));
        assert_eq!(
            lc.persisted_manifest().await.unwrap(),
            Some(ResourceManifest::from_pairs([("a.js", "hash1"), ("index.html", "hash2")]))
        );
    }

    #[tokio::test]
    async fn unchanged_entries_survive_byte_identical() {
        let h = Harness::new();
        h.seed_record(&[("lib.js", "same"), ("gone.js", "x")]).await;
        h.seed("app-cache", "lib.js", "library bytes").await;
        h.seed("app-cache", "gone.js", "removed").await;
        let lc = h.lifecycle(&[("lib.js", "same"), ("new.js", "y")], &[]);

        assert!(lc.activate().await.is_success());
        assert_eq!(h.body("app-cache", "lib.js").await.as_deref(), Some("library bytes"));
        assert_eq!(h.body("app-cache", "gone.js").await, None);
        assert!(h.network.fetched().is_empty());
    }

    #[tokio::test]
    async fn versioned_urls_are_evicted() {
        let h = Harness::new();
        h.seed_record(&[("main.js", "h")]).await;
        h.store("app-cache")
            .await
            .put(
                &Request::get(format!("{ORIGIN}/main.js?v=3")),
                &Response::new(200, "v3"),
            )
            .await
            .unwrap();
        let lc = h.lifecycle(&[("main.js", "h")], &[]);

        assert!(lc.activate().await.is_success());
        assert!(h.content_paths().await.is_empty());
    }

    #[tokio::test]
    async fn activation_is_idempotent() {
        let h = Harness::new();
        h.seed_record(&[("a.js", "1"), ("b.js", "2"), ("/", "3")]).await;
        h.seed("app-cache", "a.js", "a").await;
        h.seed("app-cache", "b.js", "b").await;
        h.seed("app-cache", "/", "root").await;
        let lc = h.lifecycle(&[("a.js", "1"), ("b.js", "2"), ("/", "4")], &[]);

        assert!(lc.activate().await.is_success());
        let after_first = h.content_paths().await;
        assert!(lc.activate().await.is_success());
        assert_eq!(h.content_paths().await, after_first);
        assert_eq!(after_first, vec!["a.js".to_string(), "b.js".to_string()]);
    }

    #[tokio::test]
    async fn temp_is_empty_after_activation() {
        let h = Harness::new();
        h.seed_record(&[("index.html", "1")]).await;
        h.seed("app-temp-cache", "index.html", "x").await;
        let lc = h.lifecycle(&[("index.html", "1")], &["index.html"]);

        assert!(lc.activate().await.is_success());
        assert_eq!(h.store("app-temp-cache").await.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn corrupt_record_wipes_every_store() {
        let h = Harness::new();
        h.store("app-manifest")
            .await
            .put(
                &Request::get(resource_url(ORIGIN, MANIFEST_RECORD_KEY)),
                &Response::new(200, "{not json"),
            )
            .await
            .unwrap();
        h.seed("app-cache", "a.js", "a").await;
        h.seed("app-temp-cache", "index.html", "i").await;
        let lc = h.lifecycle(&[("a.js", "1"), ("index.html", "2")], &["index.html"]);

        let outcome = lc.activate().await;
        assert!(matches!(outcome, ActivationOutcome::WipeAndReset { .. }));
        assert!(h.caches.names().await.unwrap().is_empty());
        assert!(!h.clients.is_claimed());
    }

    // =========================================================================
    // fetch
    // =========================================================================

    #[tokio::test]
    async fn non_get_and_unmanaged_requests_pass_through() {
        let h = Harness::new();
        let lc = h.lifecycle(&[("a.js", "1")], &[]);

        let post = Request::new(Method::POST, resource_url(ORIGIN, "a.js"));
        assert_eq!(lc.fetch(&post).await.unwrap(), FetchOutcome::PassThrough);
        assert_eq!(lc.fetch(&get("api/data")).await.unwrap(), FetchOutcome::PassThrough);
        assert_eq!(
            lc.fetch(&Request::get("https://cdn.test/a.js")).await.unwrap(),
            FetchOutcome::PassThrough
        );
        assert!(h.network.fetched().is_empty());
    }

    #[tokio::test]
    async fn cache_miss_populates_then_hits() {
        let h = Harness::new();
        h.network.serve("a.js", 200, "aaa");
        let lc = h.lifecycle(&[("a.js", "1")], &[]);

        let (body, source) = respond(lc.fetch(&get("a.js")).await.unwrap());
        assert_eq!((body.as_str(), source), ("aaa", ResponseSource::Network));

        let (body, source) = respond(lc.fetch(&get("a.js")).await.unwrap());
        assert_eq!((body.as_str(), source), ("aaa", ResponseSource::Cache));
        assert_eq!(h.network.fetched().len(), 1);
    }

    #[tokio::test]
    async fn versioned_request_is_cached_under_its_own_url() {
        let h = Harness::new();
        h.network.serve("a.js?v=9", 200, "nine");
        let lc = h.lifecycle(&[("a.js", "1")], &[]);

        let (body, _) = respond(lc.fetch(&get("a.js?v=9")).await.unwrap());
        assert_eq!(body, "nine");
        assert_eq!(h.body("app-cache", "a.js?v=9").await.as_deref(), Some("nine"));
        assert_eq!(h.body("app-cache", "a.js").await, None);
    }

    #[tokio::test]
    async fn error_status_is_returned_but_not_cached() {
        let h = Harness::new();
        h.network.serve("a.js", 503, "busy");
        let lc = h.lifecycle(&[("a.js", "1")], &[]);

        let FetchOutcome::Respond { response, .. } = lc.fetch(&get("a.js")).await.unwrap() else {
            panic!("expected response");
        };
        assert_eq!(response.status, 503);
        assert_eq!(h.store("app-cache").await.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn cache_miss_offline_propagates_error() {
        let h = Harness::new();
        h.network.set_offline(true);
        let lc = h.lifecycle(&[("a.js", "1")], &[]);
        assert!(lc.fetch(&get("a.js")).await.unwrap_err().is_network());
    }

    #[tokio::test]
    async fn root_online_returns_live_and_updates_cache() {
        let h = Harness::new();
        h.seed("app-cache", "/", "stale root").await;
        h.network.serve("/", 200, "live root");
        let lc = h.lifecycle(&[("/", "1")], &[]);

        let (body, source) = respond(lc.fetch(&get("/")).await.unwrap());
        assert_eq!((body.as_str(), source), ("live root", ResponseSource::Network));
        assert_eq!(h.body("app-cache", "/").await.as_deref(), Some("live root"));
    }

    #[tokio::test]
    async fn root_offline_falls_back_to_cache() {
        let h = Harness::new();
        h.seed("app-cache", "/", "cached root").await;
        h.network.set_offline(true);
        let lc = h.lifecycle(&[("/", "1")], &[]);

        let (body, source) = respond(lc.fetch(&get("/")).await.unwrap());
        assert_eq!((body.as_str(), source), ("cached root", ResponseSource::Cache));
    }

    #[tokio::test]
    async fn root_offline_without_cache_fails_with_network_error() {
        let h = Harness::new();
        h.network.set_offline(true);
        let lc = h.lifecycle(&[("/", "1")], &[]);

        let err = lc.fetch(&get("/")).await.unwrap_err();
        assert!(matches!(err, Error::Network { ref reason, .. } if reason == "offline"));
    }

    #[tokio::test]
    async fn root_aliases_use_online_first() {
        let h = Harness::new();
        h.network.serve("/", 200, "root");
        let lc = h.lifecycle(&[("/", "1")], &[]);

        for url in [ORIGIN.to_string(), format!("{ORIGIN}/#/home"), format!("{ORIGIN}/?v=2")] {
            h.network
                .responses
                .lock()
                .unwrap()
                .insert(url.clone(), Response::new(200, "root"));
            let (_, source) = respond(lc.fetch(&Request::get(url)).await.unwrap());
            assert_eq!(source, ResponseSource::Network);
        }
    }

    // =========================================================================
    // messages
    // =========================================================================

    #[tokio::test]
    async fn skip_waiting_message_does_not_claim() {
        let h = Harness::new();
        let lc = h.lifecycle(&[("a.js", "1")], &[]);

        assert!(lc.handle_message(Message::SkipWaiting).is_none());
        assert!(h.clients.skip_waiting_requested());
        assert!(!h.clients.is_claimed());
    }

    #[tokio::test]
    async fn download_offline_fetches_exactly_the_missing() {
        let h = Harness::new();
        let paths = ["/", "a.js", "b.js", "c.js", "index.html"];
        for path in paths {
            h.network.serve(path, 200, path);
        }
        h.seed("app-cache", "/", "cached").await;
        h.seed("app-cache", "a.js", "cached").await;
        h.seed("app-cache", "index.html", "cached").await;
        let lc = h.lifecycle(&paths.map(|p| (p, "h")), &[]);

        assert_eq!(
            lc.missing_resources().await.unwrap(),
            vec!["b.js".to_string(), "c.js".to_string()]
        );

        let handle = lc.handle_message(Message::DownloadOffline).unwrap();
        handle.await.unwrap();

        let mut fetched = h.network.fetched();
        fetched.sort();
        assert_eq!(
            fetched,
            vec![resource_url(ORIGIN, "b.js"), resource_url(ORIGIN, "c.js")]
        );
        assert_eq!(h.content_paths().await.len(), 5);
        assert_eq!(h.body("app-cache", "a.js").await.as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn download_offline_failure_is_swallowed() {
        let h = Harness::new();
        h.network.serve("a.js", 200, "a");
        let lc = h.lifecycle(&[("a.js", "1"), ("b.js", "2")], &[]);

        let handle = lc.handle_message(Message::DownloadOffline).unwrap();
        handle.await.unwrap();
        assert_eq!(h.store("app-cache").await.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn download_offline_reports_skipped() {
        let h = Harness::new();
        h.network.serve("b.js", 200, "bb");
        h.seed("app-cache", "a.js", "a").await;
        let lc = h.lifecycle(&[("a.js", "1"), ("b.js", "2")], &[]);

        let stats = lc.download_offline(&NoProgress).await.unwrap();
        assert_eq!(stats.resources_stored, 1);
        assert_eq!(stats.resources_skipped, 1);
        assert_eq!(stats.total_bytes, 2);
    }

    #[tokio::test]
    async fn shutdown_cancels_background_download() {
        let h = Harness::new();
        h.network.serve("a.js", 200, "a");
        let lc = h.lifecycle(&[("a.js", "1")], &[]);

        lc.shutdown();
        let handle = lc.handle_message(Message::DownloadOffline).unwrap();
        handle.await.unwrap();
        assert!(h.network.fetched().is_empty());
        assert_eq!(h.store("app-cache").await.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn download_offline_after_shutdown_is_cancelled() {
        let h = Harness::new();
        h.network.serve("a.js", 200, "a");
        let lc = h.lifecycle(&[("a.js", "1")], &[]);

        lc.shutdown();
        let err = lc.download_offline(&NoProgress).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(h.network.fetched().is_empty());
    }

    #[tokio::test]
    async fn install_after_shutdown_renews_background_work() {
        let h = Harness::new();
        h.network.serve("index.html", 200, "<html>");
        h.network.serve("a.js", 200, "a");
        let lc = h.lifecycle(&[("index.html", "1"), ("a.js", "2")], &["index.html"]);

        lc.shutdown();
        lc.install().await.unwrap();
        let handle = lc.handle_message(Message::DownloadOffline).unwrap();
        handle.await.unwrap();
        assert_eq!(h.body("app-cache", "a.js").await.as_deref(), Some("a"));
    }

    // =========================================================================
    // dispatch
    // =========================================================================

    #[tokio::test]
    async fn dispatch_runs_full_lifecycle() {
        let h = Harness::new();
        h.network.serve("index.html", 200, "<html>");
        h.network.serve("a.js", 200, "a");
        let lc = h.lifecycle(&[("index.html", "1"), ("a.js", "2")], &["index.html"]);

        assert!(matches!(
            lc.dispatch(WorkerEvent::Install).await.unwrap(),
            EventOutcome::Installed(_)
        ));
        assert!(matches!(
            lc.dispatch(WorkerEvent::Activate).await.unwrap(),
            EventOutcome::Activated(ActivationOutcome::Success(_))
        ));
        h.network.clear_log();

        let EventOutcome::Fetched(outcome) =
            lc.dispatch(WorkerEvent::Fetch(get("index.html"))).await.unwrap()
        else {
            panic!("expected fetch outcome");
        };
        assert_eq!(respond(outcome).1, ResponseSource::Cache);
        assert!(h.network.fetched().is_empty());

        let EventOutcome::MessageHandled(Some(handle)) = lc
            .dispatch(WorkerEvent::Message(Message::DownloadOffline))
            .await
            .unwrap()
        else {
            panic!("expected background task");
        };
        handle.await.unwrap();
        assert_eq!(h.network.fetched(), vec![resource_url(ORIGIN, "a.js")]);
    }
}
