//! LRU cache in front of an `Embedder` (AMBIENT-6), grounded on the
//! teacher's `embedding/cache.rs`. Keyed on `(model_name, text)` so repeated
//! PreTurn calls on a stable corpus of recent queries skip re-embedding.
//! Purely a performance layer: it never changes what vector a given text
//! maps to, only how often the underlying embedder is invoked for it.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use super::Embedder;
use crate::error::Result;

pub struct CachedEmbedder<E: Embedder> {
    inner: E,
    cache: Mutex<LruCache<String, Arc<Vec<f32>>>>,
}

impl<E: Embedder> CachedEmbedder<E> {
    pub fn new(inner: E, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn key(&self, text: &str) -> String {
        format!("{}\u{0}{}", self.inner.model_name(), text)
    }
}

impl<E: Embedder> Embedder for CachedEmbedder<E> {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = self.key(text);
        if let Some(hit) = self.cache.lock().get(&key) {
            return Ok((**hit).clone());
        }

        let vec = self.inner.embed(text)?;
        self.cache.lock().put(key, Arc::new(vec.clone()));
        Ok(vec)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
