//! Anomaly-based policy tightening.
//!
//! The detector reads a per-identity behavioral profile and picks which
//! policy governs the current request: a tightened transient policy for
//! callers hammering the API or erroring heavily, the base policy otherwise.
//! It never counts anything itself; enforcement is delegated entirely to the
//! selected [`RateLimiter`].
//!
//! Profile computation is an external collaborator behind [`ProfileSource`];
//! this crate ships only an in-memory source for tests and in-process
//! producers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::error::{BoxError, ConfigError};
use crate::key::RequestContext;
use crate::limiter::{Checked, RateLimiter};
use crate::store::CounterStore;

const HIGH_RATE_WINDOW: Duration = Duration::from_secs(60);
const HIGH_RATE_MAX: u64 = 10;

const ERROR_PRONE_WINDOW: Duration = Duration::from_secs(5 * 60);
const ERROR_PRONE_MAX: u64 = 20;

/// Observed behavior for one identity, computed upstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    /// Requests per minute observed recently.
    pub requests_per_minute: u64,
    /// Fraction of recent requests that errored, in `0.0..=1.0`.
    pub error_rate: f64,
}

/// External collaborator producing behavioral profiles.
///
/// Update cadence and accuracy are the producer's concern; a missing or stale
/// profile simply leaves the base policy in charge.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Profile for an identity (see [`RequestContext::identity`]), `None` when
    /// unknown.
    async fn profile(&self, identity: &str) -> Result<Option<BehaviorProfile>, BoxError>;
}

/// In-memory profile source for tests and in-process producers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfileSource {
    profiles: Arc<Mutex<HashMap<String, BehaviorProfile>>>,
}

impl InMemoryProfileSource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) an identity's profile.
    pub fn record(&self, identity: impl Into<String>, profile: BehaviorProfile) {
        self.profiles.lock().unwrap().insert(identity.into(), profile);
    }
}

#[async_trait]
impl ProfileSource for InMemoryProfileSource {
    async fn profile(&self, identity: &str) -> Result<Option<BehaviorProfile>, BoxError> {
        Ok(self.profiles.lock().unwrap().get(identity).copied())
    }
}

/// Thresholds above which a caller is considered suspicious.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyThresholds {
    /// Requests per minute beyond which the high-rate policy applies.
    pub high_requests_per_minute: u64,
    /// Error rate beyond which the error-prone policy applies.
    pub high_error_rate: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self { high_requests_per_minute: 120, high_error_rate: 0.5 }
    }
}

/// Selects the governing policy per request from the caller's profile.
pub struct AnomalyDetector<S: CounterStore + 'static, P: ProfileSource> {
    source: P,
    thresholds: AnomalyThresholds,
    base: RateLimiter<S>,
    high_rate: RateLimiter<S>,
    error_prone: RateLimiter<S>,
}

impl<S: CounterStore + 'static, P: ProfileSource> AnomalyDetector<S, P> {
    /// Detector over the base policy with default thresholds and tightened
    /// policies (high rate: 10/min; error prone: 20/5min).
    pub fn new(
        store: Arc<S>,
        source: P,
        base: RateLimitConfig,
    ) -> Result<Self, ConfigError> {
        Self::with_thresholds(store, source, base, AnomalyThresholds::default())
    }

    /// Detector with custom thresholds.
    ///
    /// Tightened policies reuse the base policy's key strategy and deny
    /// handler but count under their own key namespaces, so transient
    /// restrictions never pollute the base counters.
    pub fn with_thresholds(
        store: Arc<S>,
        source: P,
        base: RateLimitConfig,
        thresholds: AnomalyThresholds,
    ) -> Result<Self, ConfigError> {
        let high_rate = derive_tightened(
            &base,
            "suspect:rate:",
            HIGH_RATE_WINDOW,
            HIGH_RATE_MAX,
        )?;
        let error_prone = derive_tightened(
            &base,
            "suspect:errors:",
            ERROR_PRONE_WINDOW,
            ERROR_PRONE_MAX,
        )?;
        Ok(Self::with_policies(store, source, base, high_rate, error_prone, thresholds))
    }

    /// Detector with fully custom tightened policies.
    pub fn with_policies(
        store: Arc<S>,
        source: P,
        base: RateLimitConfig,
        high_rate: RateLimitConfig,
        error_prone: RateLimitConfig,
        thresholds: AnomalyThresholds,
    ) -> Self {
        Self {
            source,
            thresholds,
            base: RateLimiter::new(base, Arc::clone(&store)),
            high_rate: RateLimiter::new(high_rate, Arc::clone(&store)),
            error_prone: RateLimiter::new(error_prone, store),
        }
    }

    /// Pick the limiter governing this request.
    pub async fn select(&self, ctx: &RequestContext) -> &RateLimiter<S> {
        let identity = ctx.identity();
        match self.source.profile(&identity).await {
            Ok(Some(profile)) => {
                if profile.requests_per_minute > self.thresholds.high_requests_per_minute {
                    debug!(
                        target: "turnstile::anomaly",
                        identity = %identity,
                        requests_per_minute = profile.requests_per_minute,
                        "high request rate; applying tightened policy"
                    );
                    &self.high_rate
                } else if profile.error_rate > self.thresholds.high_error_rate {
                    debug!(
                        target: "turnstile::anomaly",
                        identity = %identity,
                        error_rate = profile.error_rate,
                        "high error rate; applying tightened policy"
                    );
                    &self.error_prone
                } else {
                    &self.base
                }
            }
            Ok(None) => &self.base,
            Err(error) => {
                warn!(
                    target: "turnstile::anomaly",
                    identity = %identity,
                    error = %error,
                    "profile lookup failed; using base policy"
                );
                &self.base
            }
        }
    }

    /// Select the governing policy, then delegate the admission check to it.
    pub async fn check(&self, ctx: &RequestContext) -> Checked<S> {
        self.select(ctx).await.check(ctx).await
    }
}

fn derive_tightened(
    base: &RateLimitConfig,
    suffix: &str,
    window: Duration,
    max: u64,
) -> Result<RateLimitConfig, ConfigError> {
    let mut builder = RateLimitConfig::builder()
        .window(window)
        .limit(max)
        .key_prefix(format!("{}{}", base.key_prefix(), suffix))
        .message(base.message().to_string())
        .status_code(base.status_code())
        .key_resolver(Arc::clone(base.key_resolver()))
        .deny_handler(Arc::clone(base.deny_handler()))
        .skip_successful_requests(base.skip_successful())
        .skip_failed_requests(base.skip_failed());
    if let Some(predicate) = base.skip() {
        builder = builder.skip(Arc::clone(predicate));
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCounterStore;

    fn detector(
        source: InMemoryProfileSource,
    ) -> AnomalyDetector<InMemoryCounterStore, InMemoryProfileSource> {
        let base = RateLimitConfig::builder()
            .window(Duration::from_secs(60))
            .limit(100)
            .key_prefix("api:")
            .build()
            .expect("valid base");
        AnomalyDetector::new(Arc::new(InMemoryCounterStore::new()), source, base)
            .expect("valid detector")
    }

    #[tokio::test]
    async fn unknown_identity_uses_base_policy() {
        let detector = detector(InMemoryProfileSource::new());
        let ctx = RequestContext::for_principal("42");
        let selected = detector.select(&ctx).await;
        assert_eq!(selected.config().key_prefix(), "api:");
    }

    #[tokio::test]
    async fn high_rate_profile_selects_tightened_policy() {
        let source = InMemoryProfileSource::new();
        source.record(
            "user:42",
            BehaviorProfile { requests_per_minute: 500, error_rate: 0.0 },
        );
        let detector = detector(source);
        let ctx = RequestContext::for_principal("42");
        let selected = detector.select(&ctx).await;
        assert_eq!(selected.config().key_prefix(), "api:suspect:rate:");
        assert_eq!(selected.config().limit().static_value(), Some(10));
    }

    #[tokio::test]
    async fn high_error_rate_selects_its_own_policy() {
        let source = InMemoryProfileSource::new();
        source.record(
            "user:42",
            BehaviorProfile { requests_per_minute: 30, error_rate: 0.9 },
        );
        let detector = detector(source);
        let ctx = RequestContext::for_principal("42");
        let selected = detector.select(&ctx).await;
        assert_eq!(selected.config().key_prefix(), "api:suspect:errors:");
        assert_eq!(selected.config().window(), Duration::from_secs(300));
        assert_eq!(selected.config().limit().static_value(), Some(20));
    }

    #[tokio::test]
    async fn rate_outranks_error_rate() {
        let source = InMemoryProfileSource::new();
        source.record(
            "user:42",
            BehaviorProfile { requests_per_minute: 500, error_rate: 0.9 },
        );
        let detector = detector(source);
        let ctx = RequestContext::for_principal("42");
        let selected = detector.select(&ctx).await;
        assert_eq!(selected.config().key_prefix(), "api:suspect:rate:");
    }

    #[tokio::test]
    async fn failing_source_falls_back_to_base() {
        struct BrokenSource;

        #[async_trait]
        impl ProfileSource for BrokenSource {
            async fn profile(
                &self,
                _identity: &str,
            ) -> Result<Option<BehaviorProfile>, BoxError> {
                Err("profile service down".into())
            }
        }

        let base = RateLimitConfig::builder().key_prefix("api:").build().expect("valid base");
        let detector =
            AnomalyDetector::new(Arc::new(InMemoryCounterStore::new()), BrokenSource, base)
                .expect("valid detector");
        let ctx = RequestContext::for_principal("42");
        let selected = detector.select(&ctx).await;
        assert_eq!(selected.config().key_prefix(), "api:");
    }
}
