//! Process-local store backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{CacheStorage, Store};
use crate::error::{Error, Result};
use crate::request::{Request, Response};

type Entries = BTreeMap<String, Response>;

fn lock<'a, T>(name: &str, mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| Error::store(name, "lock poisoned"))
}

/// A handle to one in-memory store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    name: String,
    entries: Arc<Mutex<Entries>>,
}

impl MemoryStore {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Returns the store's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.name, &self.entries)?.len())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn lookup(&self, request: &Request) -> Result<Option<Response>> {
        Ok(lock(&self.name, &self.entries)?.get(&request.url).cloned())
    }

    async fn put(&self, request: &Request, response: &Response) -> Result<()> {
        lock(&self.name, &self.entries)?.insert(request.url.clone(), response.clone());
        Ok(())
    }

    async fn delete(&self, request: &Request) -> Result<bool> {
        Ok(lock(&self.name, &self.entries)?.remove(&request.url).is_some())
    }

    async fn keys(&self) -> Result<Vec<Request>> {
        Ok(lock(&self.name, &self.entries)?
            .keys()
            .map(Request::get)
            .collect())
    }
}

/// Store collection held entirely in memory.
///
/// Clones share the same stores.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    stores: Arc<Mutex<HashMap<String, MemoryStore>>>,
}

impl MemoryCacheStorage {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    type Store = MemoryStore;

    async fn open(&self, name: &str) -> Result<MemoryStore> {
        let mut stores = lock(name, &self.stores)?;
        Ok(stores
            .entry(name.to_string())
            .or_insert_with(|| MemoryStore::new(name))
            .clone())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(lock(name, &self.stores)?.remove(name).is_some())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(lock(name, &self.stores)?.contains_key(name))
    }

    async fn names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = lock("*", &self.stores)?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
