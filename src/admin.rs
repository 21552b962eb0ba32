//! Out-of-band administrative operations against the counter store.
//!
//! These are programmatic, operator-facing calls, not part of the request
//! path, so store errors surface to the caller instead of failing open.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::clock::{epoch_millis_to_datetime, Clock, SystemClock};
use crate::store::CounterStore;

/// Non-mutating snapshot of one counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitStatus {
    /// Current count; 0 for unknown keys.
    pub count: u64,
    /// Remaining window; zero for unknown keys.
    pub ttl: Duration,
    /// When the window expires, `None` for unknown keys.
    pub reset_at: Option<DateTime<Utc>>,
}

/// Administrative handle over a counter store.
pub struct AdminHandle<S: CounterStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: CounterStore> AdminHandle<S> {
    /// Handle on the system clock.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Handle on an injected clock.
    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Destroy a counter immediately, independent of its TTL. The next
    /// request for this key behaves as first-in-window. Returns `true` when a
    /// record existed.
    pub async fn reset_limit(&self, key: &str) -> Result<bool, S::Error> {
        let removed = self.store.delete(key).await?;
        if removed {
            debug!(target: "turnstile::admin", key = %key, "rate limit reset");
        }
        Ok(removed)
    }

    /// Snapshot a counter without mutating it. Unknown keys report zero usage.
    pub async fn status(&self, key: &str) -> Result<LimitStatus, S::Error> {
        let count = self.store.get(key).await?.unwrap_or(0);
        match self.store.ttl(key).await? {
            Some(ttl) => {
                let reset_at = epoch_millis_to_datetime(
                    self.clock.now_millis() + ttl.as_millis() as u64,
                );
                Ok(LimitStatus { count, ttl, reset_at: Some(reset_at) })
            }
            None => Ok(LimitStatus { count, ttl: Duration::ZERO, reset_at: None }),
        }
    }
}
