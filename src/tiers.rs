//! Tier-based dynamic ceilings.
//!
//! Subscription tier is an upstream fact carried in
//! [`RequestContext::attributes`]; this module only maps it to an effective
//! ceiling before the counter is consulted.

use async_trait::async_trait;

use crate::config::LimitResolver;
use crate::error::BoxError;
use crate::key::RequestContext;

const DEFAULT_TIER_ATTRIBUTE: &str = "tier";

fn multiplier(tier: &str) -> u64 {
    match tier {
        "premium" => 10,
        "pro" => 5,
        "basic" => 2,
        _ => 1,
    }
}

/// Resolves the effective ceiling from the caller's subscription tier:
/// premium x10, pro x5, basic x2, anything else x1, applied to a base value.
#[derive(Debug, Clone)]
pub struct TieredLimit {
    base: u64,
    attribute: String,
}

impl TieredLimit {
    /// Tiered ceiling over the given base, read from the `tier` attribute.
    pub fn new(base: u64) -> Self {
        Self { base, attribute: DEFAULT_TIER_ATTRIBUTE.to_string() }
    }

    /// Read the tier from a different context attribute.
    pub fn with_attribute(base: u64, attribute: impl Into<String>) -> Self {
        Self { base, attribute: attribute.into() }
    }
}

#[async_trait]
impl LimitResolver for TieredLimit {
    async fn resolve(&self, ctx: &RequestContext) -> Result<u64, BoxError> {
        let tier = ctx.attributes.get(&self.attribute).map(String::as_str).unwrap_or("");
        Ok(self.base * multiplier(tier))
    }
}
