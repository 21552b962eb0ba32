//! Caller identity resolution.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::BoxError;

/// Request-scoped inputs the limiter reads from the host application.
///
/// Transport-neutral: the embedding layer copies whatever identity and
/// address material it resolved (auth principal, forwarding headers, peer
/// address) into this struct before checking a policy.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Authenticated principal id, when the caller is known.
    pub principal: Option<String>,
    /// Explicit client-address override (an `X-Real-IP` style header).
    pub ip_override: Option<String>,
    /// Proxy-forwarded address chain (an `X-Forwarded-For` style header).
    pub forwarded_for: Option<String>,
    /// Raw connection peer address.
    pub remote_addr: Option<String>,
    /// Additional attributes from upstream (subscription tier, claims, etc.).
    pub attributes: HashMap<String, String>,
}

impl RequestContext {
    /// Context for an authenticated caller.
    pub fn for_principal(id: impl Into<String>) -> Self {
        Self { principal: Some(id.into()), ..Self::default() }
    }

    /// Context for an anonymous caller known only by connection address.
    pub fn for_addr(addr: impl Into<String>) -> Self {
        Self { remote_addr: Some(addr.into()), ..Self::default() }
    }

    /// Attach an upstream attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Resolved client address: explicit override, else the first forwarded
    /// hop, else the raw peer address.
    pub fn client_addr(&self) -> Option<&str> {
        if let Some(ip) = self.ip_override.as_deref() {
            return Some(ip);
        }
        if let Some(forwarded) = self.forwarded_for.as_deref() {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return Some(first);
                }
            }
        }
        self.remote_addr.as_deref()
    }

    /// Stable identity string partitioning this caller from all others:
    /// `user:<principal>` when authenticated, else `ip:<address>`.
    pub fn identity(&self) -> String {
        match &self.principal {
            Some(id) => format!("user:{}", id),
            None => format!("ip:{}", self.client_addr().unwrap_or("unknown")),
        }
    }
}

/// Strategy mapping a request to the identity segment of its counter key.
///
/// The limiter prepends the policy's `key_prefix`, so resolvers produce only
/// the scoped identity (`user:42`, `ip:10.0.0.8`, ...). A custom resolver
/// fully replaces the default principal/address logic for its policy.
#[async_trait]
pub trait KeyResolver: Send + Sync {
    /// Resolve the identity segment for this request.
    async fn resolve(&self, ctx: &RequestContext) -> Result<String, BoxError>;
}

/// Default strategy: authenticated principal id, else resolved client address.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyResolver;

#[async_trait]
impl KeyResolver for DefaultKeyResolver {
    async fn resolve(&self, ctx: &RequestContext) -> Result<String, BoxError> {
        Ok(ctx.identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn principal_wins_over_addresses() {
        let ctx = RequestContext {
            principal: Some("42".into()),
            remote_addr: Some("10.0.0.8".into()),
            ..RequestContext::default()
        };
        let key = DefaultKeyResolver.resolve(&ctx).await.unwrap();
        assert_eq!(key, "user:42");
    }

    #[tokio::test]
    async fn override_wins_over_forwarded_and_peer() {
        let ctx = RequestContext {
            ip_override: Some("198.51.100.9".into()),
            forwarded_for: Some("203.0.113.1, 10.0.0.1".into()),
            remote_addr: Some("10.0.0.8".into()),
            ..RequestContext::default()
        };
        assert_eq!(ctx.client_addr(), Some("198.51.100.9"));
    }

    #[tokio::test]
    async fn forwarded_first_hop_wins_over_peer() {
        let ctx = RequestContext {
            forwarded_for: Some("203.0.113.1, 10.0.0.1".into()),
            remote_addr: Some("10.0.0.8".into()),
            ..RequestContext::default()
        };
        assert_eq!(ctx.client_addr(), Some("203.0.113.1"));
        assert_eq!(ctx.identity(), "ip:203.0.113.1");
    }

    #[tokio::test]
    async fn unknown_caller_gets_fallback_identity() {
        let ctx = RequestContext::default();
        assert_eq!(ctx.identity(), "ip:unknown");
    }
}
