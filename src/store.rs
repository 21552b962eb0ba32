//! Counter storage for admission decisions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};

/// Abstract storage interface for per-key admission counters.
///
/// This trait is designed to support both in-memory and distributed backends.
/// A record is `(count, ttl)`: created by the first increment in a window,
/// expired by the store when the TTL lapses, after which the next increment
/// starts a fresh window at count 1.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the current count for a key. `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<u64>, Self::Error>;

    /// Atomically increment the counter, assigning TTL = `window` iff this
    /// call created the record (returned count 1).
    ///
    /// This is the only operation that requires cross-process atomicity: it
    /// must be a single round-trip, not a read-modify-write, so that N
    /// concurrent callers against a fresh key observe counts `1..=N` with
    /// exactly one TTL assignment. Later increments never extend the TTL.
    async fn increment_and_expire(&self, key: &str, window: Duration) -> Result<u64, Self::Error>;

    /// Remaining time until the key expires. `None` when absent.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, Self::Error>;

    /// Remove the counter. Returns `true` when a live record was deleted.
    async fn delete(&self, key: &str) -> Result<bool, Self::Error>;
}

/// Simple in-memory counter store.
///
/// Expiry is lazy: a record past its deadline is discarded by whichever
/// operation touches it next. Suitable for tests and single-process
/// deployments; fleets share a distributed backend instead.
#[derive(Clone, Debug)]
pub struct InMemoryCounterStore {
    // Map key -> (count, expires_at_millis)
    data: Arc<Mutex<HashMap<String, (u64, u64)>>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCounterStore {
    /// Store running on the system wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store running on an injected clock (see [`ManualClock`] for tests).
    ///
    /// [`ManualClock`]: crate::clock::ManualClock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { data: Arc::new(Mutex::new(HashMap::new())), clock }
    }

    /// Number of live records, expired entries excluded.
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        let guard = self.data.lock().unwrap();
        guard.values().filter(|(_, expires_at)| *expires_at > now).count()
    }

    /// `true` when no live records exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    type Error = Infallible;

    async fn get(&self, key: &str) -> Result<Option<u64>, Self::Error> {
        let now = self.clock.now_millis();
        let mut guard = self.data.lock().unwrap();
        match guard.get(key) {
            Some(&(count, expires_at)) if expires_at > now => Ok(Some(count)),
            Some(_) => {
                guard.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn increment_and_expire(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<u64, Self::Error> {
        let now = self.clock.now_millis();
        let mut guard = self.data.lock().unwrap();
        match guard.get(key) {
            Some(&(count, expires_at)) if expires_at > now => {
                let next = count + 1;
                guard.insert(key.to_string(), (next, expires_at));
                Ok(next)
            }
            _ => {
                guard.insert(key.to_string(), (1, now + window.as_millis() as u64));
                Ok(1)
            }
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, Self::Error> {
        let now = self.clock.now_millis();
        let mut guard = self.data.lock().unwrap();
        match guard.get(key) {
            Some(&(_, expires_at)) if expires_at > now => {
                Ok(Some(Duration::from_millis(expires_at - now)))
            }
            Some(_) => {
                guard.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, Self::Error> {
        let now = self.clock.now_millis();
        let mut guard = self.data.lock().unwrap();
        match guard.remove(key) {
            Some((_, expires_at)) => Ok(expires_at > now),
            None => Ok(false),
        }
    }
}
