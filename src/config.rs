//! Policy configuration and the pluggable strategy seams.
//!
//! Every pluggable function (`skip`, key resolution, dynamic ceilings, deny
//! handling) is an async trait awaited at the policy boundary, so callers
//! never branch on whether a hook is sync or async.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::decision::Decision;
use crate::error::{BoxError, ConfigError};
use crate::key::{DefaultKeyResolver, KeyResolver, RequestContext};

/// Deny status code when none is configured.
pub const DEFAULT_STATUS_CODE: u16 = 429;
/// Deny message when none is configured.
pub const DEFAULT_MESSAGE: &str = "Too many requests, please try again later.";

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_LIMIT: u64 = 60;

/// Ceiling for a policy: fixed, or resolved per request.
#[derive(Clone)]
pub enum Limit {
    /// Fixed ceiling.
    Static(u64),
    /// Ceiling computed per request (tiered quotas and the like).
    Dynamic(Arc<dyn LimitResolver>),
}

impl Limit {
    /// Normalize to one concrete ceiling for this decision.
    ///
    /// A resolver returning 0 is clamped to 1 by the limiter, since a zero
    /// ceiling would deny every request the static validation rejects at
    /// construction.
    pub async fn resolve(&self, ctx: &RequestContext) -> Result<u64, BoxError> {
        match self {
            Limit::Static(n) => Ok(*n),
            Limit::Dynamic(resolver) => resolver.resolve(ctx).await,
        }
    }

    /// The ceiling when it is known without a request, `None` for dynamic limits.
    pub fn static_value(&self) -> Option<u64> {
        match self {
            Limit::Static(n) => Some(*n),
            Limit::Dynamic(_) => None,
        }
    }
}

impl fmt::Debug for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Static(n) => f.debug_tuple("Static").field(n).finish(),
            Limit::Dynamic(_) => f.debug_tuple("Dynamic").field(&"..").finish(),
        }
    }
}

/// Per-request ceiling resolution.
#[async_trait]
pub trait LimitResolver: Send + Sync {
    /// Compute the effective ceiling for this request.
    async fn resolve(&self, ctx: &RequestContext) -> Result<u64, BoxError>;
}

/// Predicate exempting a request from limiting entirely.
///
/// A `true` result short-circuits to ALLOW with no counting and no store
/// access.
#[async_trait]
pub trait SkipPredicate: Send + Sync {
    /// Whether this request bypasses the policy.
    async fn skip(&self, ctx: &RequestContext) -> Result<bool, BoxError>;
}

/// Transport-neutral payload for a denied request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenyResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Response headers to attach.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: serde_json::Value,
}

/// Strategy producing the response for a denied request.
///
/// The default implementation is just one more instance of this trait; a
/// configured handler replaces the response wholesale.
#[async_trait]
pub trait DenyHandler: Send + Sync {
    /// Build the deny response for this request.
    async fn deny(
        &self,
        ctx: &RequestContext,
        config: &RateLimitConfig,
        decision: &Decision,
    ) -> DenyResponse;
}

/// Default deny strategy: configured status code, `Retry-After` header, and a
/// structured JSON body with actionable retry metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDenyHandler;

#[async_trait]
impl DenyHandler for DefaultDenyHandler {
    async fn deny(
        &self,
        _ctx: &RequestContext,
        config: &RateLimitConfig,
        decision: &Decision,
    ) -> DenyResponse {
        let retry_after = decision.retry_after.map(|d| d.as_secs()).unwrap_or(0);
        DenyResponse {
            status: config.status_code(),
            headers: vec![("Retry-After".to_string(), retry_after.to_string())],
            body: json!({
                "success": false,
                "error": config.message(),
                "code": "RATE_LIMIT_EXCEEDED",
                "retryAfter": retry_after,
            }),
        }
    }
}

/// Validated configuration for one admission policy.
///
/// Built via [`RateLimitConfig::builder`]; invalid windows, ceilings, or
/// status codes fail at `build()` and never at request time.
#[derive(Clone)]
pub struct RateLimitConfig {
    window: Duration,
    limit: Limit,
    key_prefix: String,
    message: String,
    status_code: u16,
    skip: Option<Arc<dyn SkipPredicate>>,
    key_resolver: Arc<dyn KeyResolver>,
    deny_handler: Arc<dyn DenyHandler>,
    skip_successful: bool,
    skip_failed: bool,
}

impl fmt::Debug for RateLimitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitConfig")
            .field("window", &self.window)
            .field("limit", &self.limit)
            .field("key_prefix", &self.key_prefix)
            .field("status_code", &self.status_code)
            .field("skip_successful", &self.skip_successful)
            .field("skip_failed", &self.skip_failed)
            .finish()
    }
}

impl RateLimitConfig {
    /// Start building a policy. Defaults: 60 s window, ceiling 60, status 429,
    /// default key strategy and deny handler, every attempt counted.
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::default()
    }

    /// Counting window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Ceiling, fixed or per-request.
    pub fn limit(&self) -> &Limit {
        &self.limit
    }

    /// Prefix namespacing this policy's keys away from every other policy.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Message carried in the default deny body.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Status code for denials.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Exemption predicate, when configured.
    pub fn skip(&self) -> Option<&Arc<dyn SkipPredicate>> {
        self.skip.as_ref()
    }

    /// Key strategy for this policy.
    pub fn key_resolver(&self) -> &Arc<dyn KeyResolver> {
        &self.key_resolver
    }

    /// Deny-response strategy for this policy.
    pub fn deny_handler(&self) -> &Arc<dyn DenyHandler> {
        &self.deny_handler
    }

    /// Whether successful attempts are left uncounted.
    pub fn skip_successful(&self) -> bool {
        self.skip_successful
    }

    /// Whether failed attempts are left uncounted.
    pub fn skip_failed(&self) -> bool {
        self.skip_failed
    }
}

/// Builder for [`RateLimitConfig`].
#[derive(Clone)]
pub struct RateLimitConfigBuilder {
    window: Duration,
    limit: Limit,
    key_prefix: String,
    message: String,
    status_code: u16,
    skip: Option<Arc<dyn SkipPredicate>>,
    key_resolver: Arc<dyn KeyResolver>,
    deny_handler: Arc<dyn DenyHandler>,
    skip_successful: bool,
    skip_failed: bool,
}

impl Default for RateLimitConfigBuilder {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            limit: Limit::Static(DEFAULT_LIMIT),
            key_prefix: String::new(),
            message: DEFAULT_MESSAGE.to_string(),
            status_code: DEFAULT_STATUS_CODE,
            skip: None,
            key_resolver: Arc::new(DefaultKeyResolver),
            deny_handler: Arc::new(DefaultDenyHandler),
            skip_successful: false,
            skip_failed: false,
        }
    }
}

impl RateLimitConfigBuilder {
    /// Counting window. Must be > 0.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Fixed ceiling. Must be >= 1.
    pub fn limit(mut self, max: u64) -> Self {
        self.limit = Limit::Static(max);
        self
    }

    /// Ceiling resolved per request (see [`TieredLimit`] for the shipped
    /// resolver).
    ///
    /// [`TieredLimit`]: crate::tiers::TieredLimit
    pub fn dynamic_limit(mut self, resolver: impl LimitResolver + 'static) -> Self {
        self.limit = Limit::Dynamic(Arc::new(resolver));
        self
    }

    /// Key namespace for this policy. Distinct per policy so counters never
    /// collide.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Message for the default deny body.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Status code for denials.
    pub fn status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// Exempt requests matching this predicate.
    pub fn skip(mut self, predicate: Arc<dyn SkipPredicate>) -> Self {
        self.skip = Some(predicate);
        self
    }

    /// Replace the default key strategy.
    pub fn key_resolver(mut self, resolver: Arc<dyn KeyResolver>) -> Self {
        self.key_resolver = resolver;
        self
    }

    /// Replace the default deny-response strategy.
    pub fn deny_handler(mut self, handler: Arc<dyn DenyHandler>) -> Self {
        self.deny_handler = handler;
        self
    }

    /// Leave successful attempts uncounted (login-style policies count only
    /// failures).
    pub fn skip_successful_requests(mut self, skip: bool) -> Self {
        self.skip_successful = skip;
        self
    }

    /// Leave failed attempts uncounted.
    pub fn skip_failed_requests(mut self, skip: bool) -> Self {
        self.skip_failed = skip;
        self
    }

    /// Validate and build the policy.
    pub fn build(self) -> Result<RateLimitConfig, ConfigError> {
        if self.window.is_zero() {
            return Err(ConfigError::InvalidWindow { provided: self.window });
        }
        if let Some(0) = self.limit.static_value() {
            return Err(ConfigError::InvalidLimit { provided: 0 });
        }
        if !(100..=599).contains(&self.status_code) {
            return Err(ConfigError::InvalidStatusCode { provided: self.status_code });
        }
        Ok(RateLimitConfig {
            window: self.window,
            limit: self.limit,
            key_prefix: self.key_prefix,
            message: self.message,
            status_code: self.status_code,
            skip: self.skip,
            key_resolver: self.key_resolver,
            deny_handler: self.deny_handler,
            skip_successful: self.skip_successful,
            skip_failed: self.skip_failed,
        })
    }
}
