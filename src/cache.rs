//! Time-to-live cache for per-template metadata.
//!
//! Reads hand back stale values together with a staleness flag, so callers
//! can use what they have and refresh in the background. Time comes from an
//! injected [`Clock`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<SystemTime>,
}

impl FixedClock {
    pub fn new(now: SystemTime) -> Self {
        FixedClock {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> SystemTime {
        self.now.lock().map(|now| *now).unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    stale_at: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cached<'a, V> {
    pub value: &'a V,
    pub is_stale: bool,
}

pub struct TtlCache<V> {
    entries: HashMap<String, Entry<V>>,
    clock: Box<dyn Clock>,
}

impl<V> TtlCache<V> {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        TtlCache {
            entries: HashMap::new(),
            clock,
        }
    }

    pub fn with_system_clock() -> Self {
        TtlCache::new(Box::new(SystemClock))
    }

    pub fn read(&self, key: &str) -> Option<Cached<'_, V>> {
        let entry = self.entries.get(key)?;
        Some(Cached {
            value: &entry.value,
            is_stale: entry.stale_at <= self.clock.now(),
        })
    }

    /// Store `value`, stale after `ttl_days`
    pub fn write(&mut self, key: &str, value: V, ttl_days: u32) {
        let stale_at = self.clock.now() + DAY * ttl_days;
        self.entries.insert(key.to_string(), Entry { value, stale_at });
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        TtlCache::with_system_clock()
    }
}
