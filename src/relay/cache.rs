//! Bounded memo of past translations with insertion-order eviction

use std::collections::{HashMap, VecDeque};

use crate::core::models::TranslationRequest;

/// Exact-match cache key: two requests are cache-equivalent iff all four
/// fields match byte for byte
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    text: String,
    source_lang: String,
    target_lang: String,
    style: String,
}

impl CacheKey {
    pub fn of(request: &TranslationRequest) -> Self {
        Self {
            text: request.text.clone(),
            source_lang: request.source_lang.clone(),
            target_lang: request.target_lang.clone(),
            style: request
                .style
                .map(|s| s.tag().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Insertion-order bounded store: when full, the oldest *inserted* entry is
/// evicted, regardless of how recently it was read. No TTL, no LRU — within
/// one session duplicate utterances are common and exact-key hits are all
/// correctness requires.
#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    order: VecDeque<CacheKey>,
    entries: HashMap<CacheKey, String>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Reads never affect eviction order
    pub fn get(&self, key: &CacheKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Insert, evicting the single oldest entry when at capacity. Re-putting
    /// an existing key overwrites the value but keeps its queue position.
    pub fn put(&mut self, key: CacheKey, translation: String) {
        if self.capacity == 0 {
            return;
        }

        if self.entries.contains_key(&key) {
            self.entries.insert(key, translation);
            return;
        }

        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, translation);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
