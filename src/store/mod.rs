//! Named, durable request/response stores.
//!
//! Mirrors the shape of the browser cache API: a [`CacheStorage`] hands out
//! named [`Store`] handles, and each store maps request URLs to responses.
//! Deleting a store through [`CacheStorage::delete`] detaches any handle
//! opened before the deletion; reopening the name yields a fresh, empty store.

mod disk;
mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::{Request, Response};

pub use disk::{DiskCacheStorage, DiskStore};
pub use memory::{MemoryCacheStorage, MemoryStore};

/// A single named store of request/response pairs.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the stored response for the request's URL, if any.
    async fn lookup(&self, request: &Request) -> Result<Option<Response>>;

    /// Stores a response under the request's URL, replacing any previous entry.
    async fn put(&self, request: &Request, response: &Response) -> Result<()>;

    /// Removes the entry for the request's URL. Returns true if one existed.
    async fn delete(&self, request: &Request) -> Result<bool>;

    /// Returns a `GET` request for every stored URL.
    async fn keys(&self) -> Result<Vec<Request>>;
}

/// A collection of named stores.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Handle type returned by [`open`](Self::open).
    type Store: Store + 'static;

    /// Opens the named store, creating it if it does not exist.
    async fn open(&self, name: &str) -> Result<Self::Store>;

    /// Deletes the named store and all its entries. Returns true if it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Returns true if a store with this name exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Returns the names of all existing stores.
    async fn names(&self) -> Result<Vec<String>>;
}

/// Copies every entry of `from` into `to`, overwriting same-key entries.
///
/// Returns the URLs copied.
///
/// # Errors
///
/// Returns the first store error encountered.
pub async fn copy_entries<A, B>(from: &A, to: &B) -> Result<Vec<String>>
where
    A: Store + ?Sized,
    B: Store + ?Sized,
{
    let mut copied = Vec::new();
    for request in from.keys().await? {
        if let Some(response) = from.lookup(&request).await? {
            to.put(&request, &response).await?;
            copied.push(request.url);
        }
    }
    Ok(copied)
}
