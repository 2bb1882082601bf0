//! In-memory response cache with a fixed time-to-live.
//!
//! # Design
//! Expiry is lazy: an entry older than the TTL is evicted by the lookup that
//! notices it, there is no background sweep. The cache takes `&mut self` and
//! is meant to be owned by a single caller (a `Session`), so there is no
//! interior locking. Concurrent misses on the same key are not deduplicated;
//! the last `set` wins.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::Value;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
}

#[derive(Debug, Clone)]
pub struct Cache<V = Value> {
    entries: HashMap<String, Entry<V>>,
    ttl: Duration,
}

/// Which cache entries a mutation should drop once it succeeds.
#[derive(Debug, Clone, Default)]
pub enum Invalidate {
    #[default]
    Nothing,
    Key(String),
    Keys(Vec<String>),
    /// Every key matching the expression.
    Pattern(Regex),
}

impl Invalidate {
    pub fn pattern(expr: &str) -> Result<Self, regex::Error> {
        Regex::new(expr).map(Invalidate::Pattern)
    }
}

impl<V> Cache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Stores `value`, replacing any previous entry and resetting its age.
    pub fn set(&mut self, key: impl Into<String>, value: V) {
        self.entries.insert(
            key.into(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&mut self, key: &str, now: Instant) -> Option<&V> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => now.saturating_duration_since(entry.stored_at) > self.ttl,
        };
        if expired {
            tracing::debug!(key, "cache entry expired");
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| &entry.value)
    }

    pub fn invalidate(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Drops the entries selected by `target` and returns how many were removed.
    pub fn invalidate_where(&mut self, target: &Invalidate) -> usize {
        let before = self.entries.len();
        match target {
            Invalidate::Nothing => {}
            Invalidate::Key(key) => self.invalidate(key),
            Invalidate::Keys(keys) => {
                for key in keys {
                    self.invalidate(key);
                }
            }
            Invalidate::Pattern(re) => self.entries.retain(|key, _| !re.is_match(key)),
        }
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet looked up.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for Cache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
