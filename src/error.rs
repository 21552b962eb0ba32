//! Error types for admission policies.

use std::time::Duration;

/// Boxed error type crossing the pluggable strategy boundaries
/// (`SkipPredicate`, `KeyResolver`, `LimitResolver`, `ProfileSource`).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced when validating policy configuration.
///
/// These fail fast at construction; a built [`RateLimitConfig`] never fails
/// validation at request time.
///
/// [`RateLimitConfig`]: crate::config::RateLimitConfig
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Window must be > 0.
    InvalidWindow {
        /// Value provided by caller.
        provided: Duration,
    },
    /// Static ceiling must be >= 1.
    InvalidLimit {
        /// Value provided by caller.
        provided: u64,
    },
    /// Deny status code must be a valid HTTP status.
    InvalidStatusCode {
        /// Value provided by caller.
        provided: u16,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidWindow { provided } => {
                write!(f, "window must be > 0 (got {:?})", provided)
            }
            ConfigError::InvalidLimit { provided } => {
                write!(f, "limit must be >= 1 (got {})", provided)
            }
            ConfigError::InvalidStatusCode { provided } => {
                write!(f, "status_code must be in 100..=599 (got {})", provided)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidWindow { provided: Duration::ZERO };
        assert!(format!("{}", err).contains("window"));

        let err = ConfigError::InvalidLimit { provided: 0 };
        assert!(format!("{}", err).contains(">= 1"));

        let err = ConfigError::InvalidStatusCode { provided: 42 };
        assert!(format!("{}", err).contains("42"));
    }
}
