//! In-memory answer cache keyed by the verbatim question.
//!
//! Bounded LRU behind a mutex; `max_entries == 0` means unbounded. Entries
//! remember the mode they were produced in and only satisfy lookups in the
//! same mode.
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use handbook_core::config::AnswerMode;

use crate::engine::Answer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct CacheEntry {
    mode: AnswerMode,
    answer: Answer,
}

pub struct QueryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(max_entries: usize) -> Self {
        let entries = match NonZeroUsize::new(max_entries) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self { entries: Mutex::new(entries), hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    pub fn get(&self, question: &str, mode: AnswerMode) -> Option<Answer> {
        let mut entries = self.entries.lock();
        match entries.get(question) {
            Some(entry) if entry.mode == mode => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.answer.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, question: &str, mode: AnswerMode, answer: Answer) {
        self.entries.lock().put(question.to_string(), CacheEntry { mode, answer });
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize { self.entries.lock().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(text: &str) -> Answer {
        Answer { text: text.to_string(), sources: vec![] }
    }

    #[test]
    fn keys_are_exact_strings() {
        let cache = QueryCache::new(8);
        cache.put("How many days?", AnswerMode::Extractive, answer("15"));
        assert_eq!(cache.get("How many days?", AnswerMode::Extractive), Some(answer("15")));
        assert_eq!(cache.get("how many days?", AnswerMode::Extractive), None);
        assert_eq!(cache.get("How many days? ", AnswerMode::Extractive), None);
    }

    #[test]
    fn other_mode_is_a_miss() {
        let cache = QueryCache::new(8);
        cache.put("q", AnswerMode::Extractive, answer("free"));
        assert_eq!(cache.get("q", AnswerMode::Generative), None);
        cache.put("q", AnswerMode::Generative, answer("paid"));
        assert_eq!(cache.get("q", AnswerMode::Generative), Some(answer("paid")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = QueryCache::new(2);
        cache.put("a", AnswerMode::Extractive, answer("A"));
        cache.put("b", AnswerMode::Extractive, answer("B"));
        assert!(cache.get("a", AnswerMode::Extractive).is_some());
        cache.put("c", AnswerMode::Extractive, answer("C"));
        assert!(cache.get("b", AnswerMode::Extractive).is_none());
        assert!(cache.get("a", AnswerMode::Extractive).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_is_unbounded() {
        let cache = QueryCache::new(0);
        for i in 0..1000 {
            cache.put(&format!("q{i}"), AnswerMode::Extractive, answer("x"));
        }
        assert_eq!(cache.len(), 1000);
    }

    #[test]
    fn clear_and_stats() {
        let cache = QueryCache::new(4);
        cache.put("q", AnswerMode::Extractive, answer("x"));
        let _ = cache.get("q", AnswerMode::Extractive);
        let _ = cache.get("other", AnswerMode::Extractive);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, entries: 0 });
    }
}
