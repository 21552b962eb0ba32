//! Core admission algorithm.
//!
//! [`RateLimiter::check`] reads the counter for the caller's key and either
//! denies up front or hands back an [`Admission`] the caller settles once the
//! guarded operation finishes. Counting is deferred to settlement so policies
//! can count only failures (or only successes), and a denied request never
//! touches the counter.
//!
//! Infrastructure failures never block traffic: any store, key-resolution, or
//! predicate error is logged and the request is allowed uncounted.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::clock::{epoch_millis_to_datetime, Clock, SystemClock};
use crate::config::{DenyResponse, RateLimitConfig};
use crate::decision::Decision;
use crate::key::RequestContext;
use crate::store::CounterStore;

/// Outcome of the guarded operation, reported when settling an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The guarded operation succeeded.
    Success,
    /// The guarded operation failed.
    Failure,
}

/// Result of an admission check.
pub enum Checked<S: CounterStore + 'static> {
    /// Proceed, then settle the admission with the operation's outcome.
    Allowed(Admission<S>),
    /// Short-circuit with the attached response.
    Denied(Denial),
}

impl<S: CounterStore + 'static> Checked<S> {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Checked::Allowed(_))
    }
}

/// A denied request: quota metadata plus the response to send.
#[derive(Debug, Clone)]
pub struct Denial {
    /// Quota metadata (`retry_after` always present).
    pub decision: Decision,
    /// Response produced by the policy's deny handler.
    pub response: DenyResponse,
}

/// The admission decision engine for one policy.
///
/// The counter store is an explicitly injected dependency so deployments can
/// share one distributed backend across processes and tests can substitute an
/// in-memory double.
pub struct RateLimiter<S: CounterStore + 'static> {
    config: RateLimitConfig,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: CounterStore + 'static> RateLimiter<S> {
    /// Limiter over the given policy and store, on the system clock.
    pub fn new(config: RateLimitConfig, store: Arc<S>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Limiter on an injected clock (see [`ManualClock`] for tests).
    ///
    /// [`ManualClock`]: crate::clock::ManualClock
    pub fn with_clock(config: RateLimitConfig, store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { config, store, clock }
    }

    /// The policy this limiter enforces.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// The backing counter store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Decide whether this request may proceed.
    ///
    /// Exactly `limit` requests are admitted per window: a caller observing
    /// `count == limit - 1` is allowed and becomes the `limit`-th, the next
    /// caller observing `count == limit` is denied.
    pub async fn check(&self, ctx: &RequestContext) -> Checked<S> {
        if let Some(predicate) = self.config.skip() {
            match predicate.skip(ctx).await {
                Ok(true) => {
                    trace!(target: "turnstile::limiter", "request exempted by skip predicate");
                    return self.exempt();
                }
                Ok(false) => {}
                Err(error) => {
                    warn!(
                        target: "turnstile::limiter",
                        error = %error,
                        "skip predicate failed; allowing request"
                    );
                    return self.exempt();
                }
            }
        }

        let scoped = match self.config.key_resolver().resolve(ctx).await {
            Ok(scoped) => scoped,
            Err(error) => {
                warn!(
                    target: "turnstile::limiter",
                    error = %error,
                    "key resolution failed; allowing request"
                );
                return self.exempt();
            }
        };
        let key = format!("{}{}", self.config.key_prefix(), scoped);

        let limit = match self.config.limit().resolve(ctx).await {
            Ok(limit) => limit.max(1),
            Err(error) => {
                warn!(
                    target: "turnstile::limiter",
                    key = %key,
                    error = %error,
                    "limit resolution failed; allowing request"
                );
                return self.exempt();
            }
        };

        let count = match self.store.get(&key).await {
            Ok(count) => count.unwrap_or(0),
            Err(error) => {
                warn!(
                    target: "turnstile::limiter",
                    key = %key,
                    error = %error,
                    "counter store unavailable; allowing request"
                );
                return self.exempt();
            }
        };

        if count >= limit {
            // The window's quota is spent; denied requests are never counted.
            let retry_after = ceil_to_secs(self.config.window());
            let reset_at = self.after_now(self.config.window());
            let decision = Decision::denied(limit, Some(reset_at), retry_after);
            debug!(
                target: "turnstile::limiter",
                key = %key,
                count,
                limit,
                "rate limit exceeded"
            );
            let response = self.config.deny_handler().deny(ctx, &self.config, &decision).await;
            return Checked::Denied(Denial { decision, response });
        }

        trace!(target: "turnstile::limiter", key = %key, count, limit, "admitting request");
        Checked::Allowed(Admission {
            inner: Some(AdmissionInner {
                store: Arc::clone(&self.store),
                clock: Arc::clone(&self.clock),
                key: Some(key),
                window: self.config.window(),
                limit,
                observed: count,
                skip_successful: self.config.skip_successful(),
                skip_failed: self.config.skip_failed(),
            }),
        })
    }

    // Allowed without counting: exemptions and fail-open paths.
    fn exempt(&self) -> Checked<S> {
        let limit = self.config.limit().static_value().unwrap_or(0);
        Checked::Allowed(Admission {
            inner: Some(AdmissionInner {
                store: Arc::clone(&self.store),
                clock: Arc::clone(&self.clock),
                key: None,
                window: self.config.window(),
                limit,
                observed: 0,
                skip_successful: self.config.skip_successful(),
                skip_failed: self.config.skip_failed(),
            }),
        })
    }

    fn after_now(&self, delta: Duration) -> DateTime<Utc> {
        epoch_millis_to_datetime(self.clock.now_millis() + delta.as_millis() as u64)
    }
}

/// Permission to run the guarded operation, with the deferred count attached.
///
/// Settle exactly once with the operation's outcome; `settle` consumes the
/// admission, so double settlement is unrepresentable. An admission dropped
/// without settling (the guarded operation was aborted) counts itself as a
/// failed attempt on the current runtime rather than vanishing silently.
pub struct Admission<S: CounterStore + 'static> {
    inner: Option<AdmissionInner<S>>,
}

struct AdmissionInner<S: CounterStore + 'static> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    // None for exempted and fail-open admissions, which never count.
    key: Option<String>,
    window: Duration,
    limit: u64,
    // Count read before the guarded operation ran.
    observed: u64,
    skip_successful: bool,
    skip_failed: bool,
}

impl<S: CounterStore + 'static> Admission<S> {
    /// Effective ceiling for this request.
    pub fn limit(&self) -> u64 {
        self.inner.as_ref().map(|inner| inner.limit).unwrap_or(0)
    }

    /// Report the guarded operation's outcome and collect the final quota
    /// metadata. Counts the attempt unless the policy skips this outcome.
    pub async fn settle(mut self, outcome: RequestOutcome) -> Decision {
        match self.inner.take() {
            Some(inner) => inner.settle(outcome).await,
            // Unreachable: settle consumes the admission and Drop only fires
            // afterwards, on an empty slot.
            None => Decision::allowed(0, 0, None),
        }
    }
}

impl<S: CounterStore + 'static> Drop for Admission<S> {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else { return };
        let Some(key) = inner.key.clone() else { return };
        if !inner.counts(RequestOutcome::Failure) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(
                    target: "turnstile::limiter",
                    key = %key,
                    "admission dropped before settling; counting aborted attempt"
                );
                handle.spawn(async move {
                    if let Err(error) = inner.store.increment_and_expire(&key, inner.window).await
                    {
                        warn!(
                            target: "turnstile::limiter",
                            key = %key,
                            error = %error,
                            "counter store unavailable; aborted attempt not counted"
                        );
                    }
                });
            }
            Err(_) => {
                warn!(
                    target: "turnstile::limiter",
                    key = %key,
                    "admission dropped outside a runtime; aborted attempt not counted"
                );
            }
        }
    }
}

impl<S: CounterStore + 'static> AdmissionInner<S> {
    fn counts(&self, outcome: RequestOutcome) -> bool {
        match outcome {
            RequestOutcome::Success => !self.skip_successful,
            RequestOutcome::Failure => !self.skip_failed,
        }
    }

    async fn settle(self, outcome: RequestOutcome) -> Decision {
        let Some(ref key) = self.key else {
            return Decision::allowed(self.limit, self.limit, None);
        };

        if !self.counts(outcome) {
            return Decision::allowed(self.limit, self.limit.saturating_sub(self.observed), None);
        }

        let new_count = match self.store.increment_and_expire(&key, self.window).await {
            Ok(new_count) => new_count,
            Err(error) => {
                warn!(
                    target: "turnstile::limiter",
                    key = %key,
                    error = %error,
                    "counter store unavailable; attempt not counted"
                );
                return Decision::allowed(
                    self.limit,
                    self.limit.saturating_sub(self.observed + 1),
                    None,
                );
            }
        };

        // TTL now in effect: the full window when this increment opened it,
        // otherwise whatever remains of the window opened earlier.
        let ttl = if new_count == 1 {
            self.window
        } else {
            match self.store.ttl(&key).await {
                Ok(Some(ttl)) => ttl,
                Ok(None) => self.window,
                Err(error) => {
                    warn!(
                        target: "turnstile::limiter",
                        key = %key,
                        error = %error,
                        "ttl probe failed; reporting full window"
                    );
                    self.window
                }
            }
        };
        let reset_at =
            epoch_millis_to_datetime(self.clock.now_millis() + ttl.as_millis() as u64);
        Decision::allowed(self.limit, self.limit.saturating_sub(new_count), Some(reset_at))
    }
}

// Seconds granularity for Retry-After, rounding partial seconds up.
fn ceil_to_secs(window: Duration) -> Duration {
    let mut secs = window.as_secs();
    if window.subsec_nanos() > 0 {
        secs += 1;
    }
    Duration::from_secs(secs.max(1))
}
