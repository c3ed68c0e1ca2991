//! Concurrency-safe, insertion-ordered cache store.

use super::types::{CacheEntry, CacheKey};
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory store mapping cache keys to the most recent recorded entry.
///
/// Insertion order is retained for deterministic export; overwriting a key
/// bumps it to the end of the order, so the ordered listing always reads
/// oldest-write to newest-write. Writes take the lock exclusively, so
/// concurrent puts for one key leave exactly one complete entry behind.
#[derive(Default)]
pub struct CacheStore {
    inner: RwLock<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    entries: HashMap<CacheKey, CacheEntry>,
    order: Vec<CacheKey>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.inner.read().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.read().entries.contains_key(key)
    }

    /// Insert or overwrite. A miss is represented as "no entry"; this never
    /// fails.
    pub fn put(&self, entry: CacheEntry) {
        let key = entry.key.clone();
        let mut inner = self.inner.write();
        if inner.entries.insert(key.clone(), entry).is_some() {
            inner.order.retain(|k| k != &key);
        }
        inner.order.push(key);
    }

    pub fn delete(&self, key: &CacheKey) -> bool {
        let mut inner = self.inner.write();
        if inner.entries.remove(key).is_some() {
            inner.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Snapshot of all entries in insertion order.
    pub fn list(&self) -> Vec<CacheEntry> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|key| inner.entries.get(key).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use std::sync::Arc;

    fn entry(key: &str, body: &[u8]) -> CacheEntry {
        CacheEntry {
            key: CacheKey::from_string(key.to_string()),
            method: "GET".to_string(),
            path: "/test".to_string(),
            query: None,
            request_body: Bytes::new(),
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::copy_from_slice(body),
            recorded_at: Utc::now(),
        }
    }

    fn key(raw: &str) -> CacheKey {
        CacheKey::from_string(raw.to_string())
    }

    #[test]
    fn test_put_then_get() {
        let store = CacheStore::new();
        store.put(entry("GET /a", b"one"));
        let found = store.get(&key("GET /a")).unwrap();
        assert_eq!(&found.body[..], b"one");
        assert!(store.get(&key("GET /b")).is_none());
    }

    #[test]
    fn test_overwrite_replaces_and_bumps_order() {
        let store = CacheStore::new();
        store.put(entry("GET /a", b"first"));
        store.put(entry("GET /b", b"second"));
        store.put(entry("GET /a", b"third"));

        assert_eq!(store.len(), 2);
        let listed = store.list();
        assert_eq!(listed[0].key, key("GET /b"));
        assert_eq!(listed[1].key, key("GET /a"));
        assert_eq!(&listed[1].body[..], b"third");
    }

    #[test]
    fn test_delete() {
        let store = CacheStore::new();
        store.put(entry("GET /a", b"one"));
        assert!(store.delete(&key("GET /a")));
        assert!(!store.delete(&key("GET /a")));
        assert!(store.is_empty());
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_clear() {
        let store = CacheStore::new();
        store.put(entry("GET /a", b"one"));
        store.put(entry("GET /b", b"two"));
        store.clear();
        assert!(store.is_empty());
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_list_preserves_insertion_order() {
        let store = CacheStore::new();
        store.put(entry("GET /a", b"1"));
        store.put(entry("GET /b", b"2"));
        store.put(entry("GET /c", b"3"));
        let keys: Vec<String> = store.list().iter().map(|e| e.key.to_string()).collect();
        assert_eq!(keys, vec!["GET /a", "GET /b", "GET /c"]);
    }

    #[test]
    fn test_concurrent_puts_leave_one_complete_entry() {
        let store = Arc::new(CacheStore::new());
        let bodies: Vec<Vec<u8>> = (0..8).map(|i| vec![i as u8; 4096]).collect();

        let handles: Vec<_> = bodies
            .iter()
            .cloned()
            .map(|body| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.put(entry("GET /contended", &body));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 1);
        let winner = store.get(&key("GET /contended")).unwrap();
        // Whatever write won, the stored body is one of the complete
        // candidates, never interleaved bytes.
        assert!(bodies.iter().any(|b| winner.body[..] == b[..]));
    }
}
