//! Per-discovery-call document cache and counters.
//!
//! One [`DiscoverySession`] lives for a single discovery call and is shared
//! by every worker and every mode attempt in it. Entries are keyed by
//! canonical path and validated against the file's modification time, and
//! each key is written at most once: a second writer gets the instance that
//! is already stored.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::memory::{Flattened, SourceText};
use crate::types::RuleDocument;

struct CacheEntry<T> {
    modified: SystemTime,
    value: Arc<T>,
}

/// Write-once map from canonical path to a parsed value.
pub(crate) struct DocumentCache<T> {
    entries: Mutex<HashMap<PathBuf, CacheEntry<T>>>,
}

impl<T> Default for DocumentCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> DocumentCache<T> {
    /// Cached value for `path`, if stored with the same modification time.
    pub(crate) fn get(&self, path: &Path, modified: SystemTime) -> Option<Arc<T>> {
        self.entries
            .lock()
            .get(path)
            .filter(|entry| entry.modified == modified)
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Store `value` unless an entry with the same modification time exists.
    /// Returns whichever instance ends up cached.
    pub(crate) fn insert(&self, path: PathBuf, modified: SystemTime, value: Arc<T>) -> Arc<T> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&path).filter(|e| e.modified == modified) {
            return Arc::clone(&existing.value);
        }
        let _ = entries.insert(
            path,
            CacheEntry {
                modified,
                value: Arc::clone(&value),
            },
        );
        value
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Shared state for one discovery call.
#[derive(Default)]
pub struct DiscoverySession {
    pub(crate) sources: DocumentCache<SourceText>,
    pub(crate) memory: DocumentCache<Flattened>,
    pub(crate) rules: DocumentCache<RuleDocument>,
    documents_read: AtomicUsize,
    cache_hits: AtomicUsize,
}

impl DiscoverySession {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Files read from disk so far.
    pub fn documents_read(&self) -> usize {
        self.documents_read.load(Ordering::Relaxed)
    }

    /// Cache lookups answered without reading.
    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Number of distinct documents cached.
    pub fn cached_documents(&self) -> usize {
        self.memory.len() + self.rules.len()
    }

    pub(crate) fn record_read(&self) {
        let _ = self.documents_read.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hit(&self) {
        let _ = self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for DiscoverySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoverySession")
            .field("documents_read", &self.documents_read())
            .field("cache_hits", &self.cache_hits())
            .field("cached_documents", &self.cached_documents())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn first_writer_wins() {
        let cache: DocumentCache<String> = DocumentCache::default();
        let t = SystemTime::UNIX_EPOCH;
        let first = cache.insert(PathBuf::from("/a"), t, Arc::new("first".into()));
        let second = cache.insert(PathBuf::from("/a"), t, Arc::new("second".into()));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, "first");
    }

    #[test]
    fn stale_entry_is_replaced() {
        let cache: DocumentCache<String> = DocumentCache::default();
        let old = SystemTime::UNIX_EPOCH;
        let new = old + Duration::from_secs(5);
        let _ = cache.insert(PathBuf::from("/a"), old, Arc::new("old".into()));

        assert!(cache.get(Path::new("/a"), new).is_none());
        let stored = cache.insert(PathBuf::from("/a"), new, Arc::new("new".into()));
        assert_eq!(*stored, "new");
        assert_eq!(cache.get(Path::new("/a"), new).as_deref().map(String::as_str), Some("new"));
    }

    #[test]
    fn counters() {
        let session = DiscoverySession::new();
        session.record_read();
        session.record_read();
        session.record_hit();
        assert_eq!(session.documents_read(), 2);
        assert_eq!(session.cache_hits(), 1);
        assert_eq!(session.cached_documents(), 0);
    }

    #[test]
    fn concurrent_inserts_share_one_instance() {
        let cache: Arc<DocumentCache<usize>> = Arc::new(DocumentCache::default());
        let t = SystemTime::UNIX_EPOCH;
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.insert(PathBuf::from("/shared"), t, Arc::new(i)))
            })
            .collect();
        let values: Vec<Arc<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(values.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
