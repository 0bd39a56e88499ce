//! All-or-nothing bulk population of a store from the network.

use futures::{StreamExt, stream};

use crate::error::{Error, Result};
use crate::network::Network;
use crate::request::{Request, Response};
use crate::stats::{FillStats, FillStatsBuilder};
use crate::store::Store;

/// Trait for receiving fill progress updates.
///
/// All methods have default no-op implementations for convenience.
pub trait FillProgress: Send + Sync {
    /// Called once before fetching with the number of requests.
    fn on_fill_start(&self, _count: usize) {}

    /// Called when a resource has been fetched.
    fn on_resource_fetched(&self, _url: &str, _bytes: u64) {}

    /// Called when fetching a resource fails.
    fn on_error(&self, _url: &str, _error: &str) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl FillProgress for NoProgress {}

/// Fetches a single request and rejects responses that are not ok.
async fn fetch_ok<N: Network + ?Sized>(network: &N, request: &Request) -> Result<Response> {
    let response = network.fetch(request).await?;
    if !response.is_ok() {
        return Err(Error::BadStatus {
            url: request.url.clone(),
            status: response.status,
        });
    }
    Ok(response)
}

/// Fetches every request and stores the responses.
///
/// Up to `concurrency` requests are in flight at once. If any request fails
/// or returns a non-ok status, the first such error is returned and nothing
/// is written to `store`.
///
/// # Errors
///
/// Returns the first fetch error, or a store error raised while writing.
pub async fn add_all<S, N>(
    store: &S,
    network: &N,
    requests: &[Request],
    concurrency: usize,
    progress: &dyn FillProgress,
) -> Result<FillStats>
where
    S: Store + ?Sized,
    N: Network + ?Sized,
{
    add_all_with_stats(store, network, requests, concurrency, progress, FillStatsBuilder::new()).await
}

/// Like [`add_all`], but records into a builder the caller has already
/// started, e.g. one carrying a skipped count.
///
/// # Errors
///
/// Returns the first fetch error, or a store error raised while writing.
pub async fn add_all_with_stats<S, N>(
    store: &S,
    network: &N,
    requests: &[Request],
    concurrency: usize,
    progress: &dyn FillProgress,
    mut builder: FillStatsBuilder,
) -> Result<FillStats>
where
    S: Store + ?Sized,
    N: Network + ?Sized,
{
    if requests.is_empty() {
        return Ok(builder.build());
    }

    progress.on_fill_start(requests.len());

    let results: Vec<(Request, Result<Response>)> = stream::iter(requests.iter().cloned())
        .map(|request| async move {
            let result = fetch_ok(network, &request).await;
            match &result {
                Ok(response) => progress.on_resource_fetched(&request.url, response.len()),
                Err(e) => progress.on_error(&request.url, &e.to_string()),
            }
            (request, result)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut fetched = Vec::with_capacity(results.len());
    for (request, result) in results {
        fetched.push((request, result?));
    }

    for (request, response) in fetched {
        store.put(&request, &response).await?;
        builder.add_stored(response.len());
    }

    Ok(builder.build())
}
