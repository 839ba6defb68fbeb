//! Process-wide cache of loaded model handles.
//!
//! Entries live until they are explicitly invalidated; there is no eviction
//! by size or age.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

/// Lookup identity of a cached model: its URL plus an optional bust token.
///
/// Two keys with the same URL but different tokens never share an entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    url: String,
    bust: Option<String>,
}

impl CacheKey {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bust: None,
        }
    }

    pub fn with_bust(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bust: Some(token.into()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn bust(&self) -> Option<&str> {
        self.bust.as_deref()
    }

    /// URL to request from the server; the bust token is appended as `t=` so
    /// intermediaries cannot answer with a stale copy either.
    pub fn fetch_url(&self) -> String {
        match &self.bust {
            None => self.url.clone(),
            Some(token) => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}t={}", self.url, separator, token)
            }
        }
    }
}

struct CacheEntry<H> {
    handle: H,
    source_url: String,
}

struct CacheInner<H> {
    entries: HashMap<CacheKey, CacheEntry<H>>,
    /// Bumped per URL on invalidation so loads started earlier cannot store
    /// their now-stale result.
    generations: HashMap<String, u64>,
    epoch: u64,
}

impl<H> CacheInner<H> {
    fn generation(&self, url: &str) -> (u64, u64) {
        (self.epoch, self.generations.get(url).copied().unwrap_or(0))
    }
}

/// Shared cache of model handles keyed by [`CacheKey`].
///
/// Cloning hands out another handle to the same store.
pub struct ModelAssetCache<H> {
    inner: Arc<RwLock<CacheInner<H>>>,
}

impl<H> Clone for ModelAssetCache<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H: Clone> Default for ModelAssetCache<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Clone> ModelAssetCache<H> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                entries: HashMap::new(),
                generations: HashMap::new(),
                epoch: 0,
            })),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<H> {
        self.inner
            .read()
            .entries
            .get(key)
            .map(|entry| entry.handle.clone())
    }

    pub fn insert(&self, key: CacheKey, handle: H) {
        let source_url = key.url.clone();
        self.inner
            .write()
            .entries
            .insert(key, CacheEntry { handle, source_url });
    }

    /// Return the cached handle or run `load` with the fetch URL and cache
    /// its result. A result whose URL was invalidated while it was loading is
    /// returned to the caller but not cached.
    pub async fn get_or_load<F, Fut, E>(&self, key: CacheKey, load: F) -> Result<H, E>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<H, E>>,
    {
        if let Some(handle) = self.get(&key) {
            debug!(url = %key.url, "Model cache hit");
            return Ok(handle);
        }

        let started_at = self.inner.read().generation(&key.url);
        debug!(url = %key.url, "Model cache miss, loading");
        let handle = load(key.fetch_url()).await?;

        let mut inner = self.inner.write();
        if inner.generation(&key.url) == started_at {
            let source_url = key.url.clone();
            inner.entries.insert(
                key,
                CacheEntry {
                    handle: handle.clone(),
                    source_url,
                },
            );
        } else {
            debug!(url = %key.url, "Model invalidated during load, not caching");
        }
        Ok(handle)
    }

    /// Drop every entry loaded from `url`, whatever its bust token.
    /// Returns how many entries were removed.
    pub fn invalidate(&self, url: &str) -> usize {
        let mut inner = self.inner.write();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| entry.source_url != url);
        *inner.generations.entry(url.to_string()).or_insert(0) += 1;
        let removed = before - inner.entries.len();
        debug!(url = %url, removed, "Invalidated cached model");
        removed
    }

    /// Guarantee that the next lookup of every key misses.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.epoch += 1;
        debug!("Invalidated all cached models");
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.read().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
