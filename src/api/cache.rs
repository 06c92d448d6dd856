//! Last-good response store used as a fallback when a read fails

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.origin + offset
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Value,
    timestamp: Instant,
}

/// Per-endpoint cache; an entry is valid while `now - timestamp < expiry`
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    expiry: Duration,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(expiry: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            expiry,
            clock,
        }
    }

    pub const fn expiry(&self) -> Duration {
        self.expiry
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Overwrite the entry for `endpoint`, stamped with the current time
    pub fn store(&self, endpoint: &str, data: Value) {
        let entry = CacheEntry {
            data,
            timestamp: self.clock.now(),
        };
        self.lock().insert(endpoint.to_string(), entry);
    }

    /// Valid entry for `endpoint` together with its age
    pub fn get_valid(&self, endpoint: &str) -> Option<(Value, Duration)> {
        let now = self.clock.now();
        let entries = self.lock();
        let entry = entries.get(endpoint)?;
        let age = now.saturating_duration_since(entry.timestamp);
        (age < self.expiry).then(|| (entry.data.clone(), age))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
