//! Serves responses from a cache and fills it from onward calls.
//!
//! The cache itself is behind two seams: a [`CacheStore`] that opens a named
//! [`Cache`] (opened once per filter, on first use), and a [`CacheLookup`]
//! strategy that decides how a request is matched against stored entries.
//! The default [`NoLookup`] never matches, which turns the filter into a
//! write-through recorder; [`FullLookup`] consults the cache on every
//! request. Every fresh response is stored, whatever its status, and a
//! failed store is logged rather than failing the request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::{BoxError, Error};
use crate::filter::{Filter, Next};
use crate::metadata::Metadata;
use crate::request::Request;
use crate::response::{Response, ResponseBody};

/// A named collection of request/response pairs.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Looks up a stored response for the request.
    async fn matched(&self, request: &Request) -> Result<Option<Response>, Error>;

    /// Stores the response under the request. The response body must already
    /// be buffered.
    async fn put(&self, request: Request, response: &Response) -> Result<(), Error>;
}

/// Opens named caches. Opening the same name twice yields the same storage.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, BoxError>;
}

/// How the filter matches incoming requests against the cache.
#[async_trait]
pub trait CacheLookup: Send + Sync {
    async fn lookup(
        &self,
        cache: &dyn Cache,
        request: &Request,
    ) -> Result<Option<Response>, Error>;
}

/// Never matches; every request goes onward and fills the cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

#[async_trait]
impl CacheLookup for NoLookup {
    async fn lookup(
        &self,
        _cache: &dyn Cache,
        _request: &Request,
    ) -> Result<Option<Response>, Error> {
        Ok(None)
    }
}

/// Consults the cache for every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullLookup;

#[async_trait]
impl CacheLookup for FullLookup {
    async fn lookup(&self, cache: &dyn Cache, request: &Request) -> Result<Option<Response>, Error> {
        cache.matched(request).await
    }
}

pub struct CacheFilter {
    store: Arc<dyn CacheStore>,
    name: String,
    lookup: Arc<dyn CacheLookup>,
    cache: OnceCell<Arc<dyn Cache>>,
}

impl CacheFilter {
    /// A write-through recorder: fills the cache but never serves from it.
    /// Use [`with_lookup`](Self::with_lookup) to serve stored entries.
    pub fn new(store: Arc<dyn CacheStore>, name: impl Into<String>) -> Self {
        Self::with_lookup(store, name, Arc::new(NoLookup))
    }

    pub fn with_lookup(
        store: Arc<dyn CacheStore>,
        name: impl Into<String>,
        lookup: Arc<dyn CacheLookup>,
    ) -> Self {
        Self { store, name: name.into(), lookup, cache: OnceCell::new() }
    }

    async fn cache(&self) -> Result<&Arc<dyn Cache>, BoxError> {
        self.cache.get_or_try_init(|| self.store.open(&self.name)).await
    }
}

#[async_trait]
impl Filter for CacheFilter {
    async fn apply(&self, request: Request, next: Next) -> Result<Response, Error> {
        let cache = match self.cache().await {
            Ok(cache) => Arc::clone(cache),
            Err(cause) => return Err(Error::new(cause, request.metadata().clone())),
        };

        if let Some(mut hit) = self.lookup.lookup(cache.as_ref(), &request).await? {
            debug!(uri = %request.uri(), "cache hit");
            // Request-scoped entries still reach the caller; entries stored
            // with the cached response win on conflict.
            let merged = request.metadata().merge(hit.metadata());
            *hit.metadata_mut() = merged;
            return Ok(hit);
        }

        let key = request.clone_request(true);
        let response = next.run(request).await?;
        if let Err(error) = cache.put(key, &response).await {
            warn!(cause = %error, "cache store failed");
        }
        Ok(response)
    }
}

impl std::fmt::Debug for CacheFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheFilter").field("name", &self.name).finish()
    }
}

/// An in-process [`CacheStore`] keyed by cache name.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    caches: Mutex<HashMap<String, Arc<MemoryCache>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, BoxError> {
        let mut caches = self.caches.lock().expect("cache store lock poisoned");
        let cache = caches.entry(name.to_string()).or_default();
        Ok(Arc::clone(cache) as Arc<dyn Cache>)
    }
}

#[derive(Debug, Default)]
struct MemoryCache {
    entries: Mutex<HashMap<String, CachedEntry>>,
}

#[derive(Debug, Clone)]
struct CachedEntry {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    metadata: Metadata,
}

fn entry_key(request: &Request) -> String {
    format!("{} {}", request.method(), request.uri())
}

#[async_trait]
impl Cache for MemoryCache {
    async fn matched(&self, request: &Request) -> Result<Option<Response>, Error> {
        let entry = {
            let entries = self.entries.lock().expect("cache lock poisoned");
            entries.get(&entry_key(request)).cloned()
        };
        Ok(entry.map(|entry| {
            Response::new(
                entry.status,
                entry.headers,
                ResponseBody::from(entry.body),
                entry.metadata,
            )
        }))
    }

    async fn put(&self, request: Request, response: &Response) -> Result<(), Error> {
        let body = response.bytes().await?;
        let entry = CachedEntry {
            status: response.status(),
            headers: response.headers().clone(),
            body,
            metadata: response.metadata().clone(),
        };
        self.entries.lock().expect("cache lock poisoned").insert(entry_key(&request), entry);
        Ok(())
    }
}
