//! Convenient re-exports for common Turnstile types.
pub use crate::{
    admin::{AdminHandle, LimitStatus},
    anomaly::{AnomalyDetector, AnomalyThresholds, BehaviorProfile, ProfileSource},
    clock::{Clock, ManualClock, SystemClock},
    config::{
        DefaultDenyHandler, DenyHandler, DenyResponse, Limit, LimitResolver, RateLimitConfig,
        SkipPredicate,
    },
    error::{BoxError, ConfigError},
    key::{DefaultKeyResolver, KeyResolver, RequestContext},
    middleware::{AdmissionError, AdmissionLayer, AdmissionService},
    presets,
    store::{CounterStore, InMemoryCounterStore},
    tiers::TieredLimit,
    Checked, Decision, Denial, RateLimiter, RequestOutcome,
};
