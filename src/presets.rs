//! Ready-made admission policies.
//!
//! Pure configuration composition over the limiter core: each preset is a
//! named [`RateLimitConfig`] with its own window, ceiling, and key namespace.
//! Pair one with a store via [`RateLimiter::new`].
//!
//! [`RateLimiter::new`]: crate::limiter::RateLimiter::new

use std::time::Duration;

use crate::config::RateLimitConfig;

const LOGIN_WINDOW: Duration = Duration::from_secs(15 * 60);
const LOGIN_MAX: u64 = 5;

const GENERAL_API_WINDOW: Duration = Duration::from_secs(60);
const GENERAL_API_MAX: u64 = 60;

const UPLOAD_WINDOW: Duration = Duration::from_secs(60 * 60);
const UPLOAD_MAX: u64 = 20;

const CODE_GENERATION_WINDOW: Duration = Duration::from_secs(60);
const CODE_GENERATION_MAX: u64 = 10;

const CONNECTION_WINDOW: Duration = Duration::from_secs(60);
const CONNECTION_MAX: u64 = 5;

/// Login attempts: 5 per 15 minutes, counting only failed attempts.
///
/// Successful logins settle uncounted, so a correct password never consumes
/// the failed-attempt quota.
pub fn login_attempts() -> RateLimitConfig {
    RateLimitConfig::builder()
        .window(LOGIN_WINDOW)
        .limit(LOGIN_MAX)
        .key_prefix("login:")
        .message("Too many login attempts, please try again later.")
        .skip_successful_requests(true)
        .build()
        .expect("valid login preset")
}

/// General API traffic: 60 requests per minute.
pub fn general_api() -> RateLimitConfig {
    RateLimitConfig::builder()
        .window(GENERAL_API_WINDOW)
        .limit(GENERAL_API_MAX)
        .key_prefix("api:")
        .build()
        .expect("valid api preset")
}

/// Uploads: 20 per hour.
pub fn upload() -> RateLimitConfig {
    RateLimitConfig::builder()
        .window(UPLOAD_WINDOW)
        .limit(UPLOAD_MAX)
        .key_prefix("upload:")
        .message("Upload quota exhausted, please try again later.")
        .build()
        .expect("valid upload preset")
}

/// Code generation: 10 per minute.
pub fn code_generation() -> RateLimitConfig {
    RateLimitConfig::builder()
        .window(CODE_GENERATION_WINDOW)
        .limit(CODE_GENERATION_MAX)
        .key_prefix("codegen:")
        .message("Code generation quota exhausted, please try again later.")
        .build()
        .expect("valid codegen preset")
}

/// Connection attempts: 5 per minute.
pub fn connection_attempt() -> RateLimitConfig {
    RateLimitConfig::builder()
        .window(CONNECTION_WINDOW)
        .limit(CONNECTION_MAX)
        .key_prefix("conn:")
        .message("Too many connection attempts, please try again later.")
        .build()
        .expect("valid connection preset")
}
