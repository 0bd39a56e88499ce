//! Durable store backend on the local file system.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<b64(store name)>/<b64(sha256(url))>.entry
//! ```
//!
//! An entry file holds one line of JSON metadata followed by the raw body.
//! Entries are written to a temporary name and renamed into place, so a
//! reader sees either the old entry or the new one, never a mix.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CacheStorage, Store};
use crate::error::{Error, Result};
use crate::request::{Request, Response};

const ENTRY_EXT: &str = "entry";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metadata line at the start of each entry file.
#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    stored_at: DateTime<Utc>,
}

fn entry_stem(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(url.as_bytes()))
}

fn encode_entry(meta: &EntryMeta, body: &[u8]) -> serde_json::Result<Vec<u8>> {
    // Compact JSON never contains a raw newline.
    let mut bytes = serde_json::to_vec(meta)?;
    bytes.push(b'\n');
    bytes.extend_from_slice(body);
    Ok(bytes)
}

fn split_entry(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let newline = bytes.iter().position(|&b| b == b'\n')?;
    Some((&bytes[..newline], &bytes[newline + 1..]))
}

/// Writes `contents` to `path` via a uniquely named temporary file.
async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("{}-{n}.tmp", std::process::id()));
    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

/// Reads a file, mapping "not found" to `None`.
async fn read_optional(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Removes a file, mapping "not found" to `false`.
async fn remove_optional(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// A handle to one on-disk store.
///
/// Once the store is deleted through [`DiskCacheStorage::delete`], writes
/// through an older handle fail until the name is opened again.
#[derive(Debug, Clone)]
pub struct DiskStore {
    name: String,
    dir: PathBuf,
}

impl DiskStore {
    fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXT}", entry_stem(url)))
    }

    fn io_err(&self, e: &std::io::Error) -> Error {
        Error::store(&self.name, e.to_string())
    }

    fn corrupt(&self, path: &Path, reason: impl std::fmt::Display) -> Error {
        Error::store(&self.name, format!("corrupt entry {}: {reason}", path.display()))
    }

    async fn read_entry(&self, path: &Path) -> Result<Option<(EntryMeta, Vec<u8>)>> {
        let Some(bytes) = read_optional(path).await.map_err(|e| self.io_err(&e))? else {
            return Ok(None);
        };
        let (header, body) = split_entry(&bytes).ok_or_else(|| self.corrupt(path, "missing header"))?;
        let meta = serde_json::from_slice(header).map_err(|e| self.corrupt(path, e))?;
        Ok(Some((meta, body.to_vec())))
    }

    /// Reads only the metadata line of an entry.
    async fn read_meta(&self, path: &Path) -> Result<Option<EntryMeta>> {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(&e)),
        };
        let mut header = Vec::new();
        BufReader::new(file)
            .read_until(b'\n', &mut header)
            .await
            .map_err(|e| self.io_err(&e))?;
        if header.pop() != Some(b'\n') {
            return Err(self.corrupt(path, "missing header"));
        }
        let meta = serde_json::from_slice(&header).map_err(|e| self.corrupt(path, e))?;
        Ok(Some(meta))
    }
}

#[async_trait]
impl Store for DiskStore {
    async fn lookup(&self, request: &Request) -> Result<Option<Response>> {
        let Some((meta, body)) = self.read_entry(&self.entry_path(&request.url)).await? else {
            return Ok(None);
        };
        Ok(Some(Response {
            status: meta.status,
            headers: meta.headers,
            body: body.into(),
        }))
    }

    async fn put(&self, request: &Request, response: &Response) -> Result<()> {
        let meta = EntryMeta {
            url: request.url.clone(),
            status: response.status,
            headers: response.headers.clone(),
            stored_at: Utc::now(),
        };
        let entry = encode_entry(&meta, &response.body)?;
        write_atomic(&self.entry_path(&request.url), &entry)
            .await
            .map_err(|e| self.io_err(&e))
    }

    async fn delete(&self, request: &Request) -> Result<bool> {
        remove_optional(&self.entry_path(&request.url))
            .await
            .map_err(|e| self.io_err(&e))
    }

    async fn keys(&self) -> Result<Vec<Request>> {
        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(&e)),
        };

        let mut urls = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(|e| self.io_err(&e))? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXT)
                && let Some(meta) = self.read_meta(&path).await?
            {
                urls.push(meta.url);
            }
        }
        urls.sort();
        Ok(urls.into_iter().map(Request::get).collect())
    }
}

/// Store collection persisted under a root directory.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    /// Creates a collection rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_dir(&self, name: &str) -> PathBuf {
        self.root.join(URL_SAFE_NO_PAD.encode(name.as_bytes()))
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    type Store = DiskStore;

    async fn open(&self, name: &str) -> Result<DiskStore> {
        let dir = self.store_dir(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::store(name, e.to_string()))?;
        Ok(DiskStore {
            name: name.to_string(),
            dir,
        })
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        match tokio::fs::remove_dir_all(self.store_dir(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::store(name, e.to_string())),
        }
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(tokio::fs::metadata(self.store_dir(name))
            .await
            .is_ok_and(|m| m.is_dir()))
    }

    async fn names(&self) -> Result<Vec<String>> {
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let decoded = entry
                .file_name()
                .to_str()
                .and_then(|s| URL_SAFE_NO_PAD.decode(s).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok());
            if let Some(name) = decoded {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}
