#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Turnstile
//!
//! Admission control for async Rust: fixed-window rate limiting over a
//! pluggable atomic counter store, with presets, tiered dynamic ceilings,
//! anomaly-based tightening, and fail-open error semantics.
//!
//! ## Features
//!
//! - **Fixed-window counting** anchored to the first request, expiring with
//!   the store's TTL
//! - **Pluggable storage** via [`CounterStore`]: in-memory here, Redis in the
//!   `turnstile-redis` companion crate
//! - **Deferred counting**: outcomes settle after the guarded operation, so
//!   policies can count only failures (login-style) or only successes
//! - **Fail-open**: infrastructure failures never block legitimate traffic
//! - **Data-driven policies**: presets, per-tier ceilings, anomaly tightening
//! - **Tower middleware** for wiring the guard into a service stack
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use turnstile::{Checked, InMemoryCounterStore, RateLimiter, RequestContext, RequestOutcome};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(InMemoryCounterStore::new());
//!     let limiter = RateLimiter::new(turnstile::presets::general_api(), store);
//!
//!     let ctx = RequestContext::for_addr("203.0.113.7");
//!     match limiter.check(&ctx).await {
//!         Checked::Allowed(admission) => {
//!             // ... run the guarded operation ...
//!             let decision = admission.settle(RequestOutcome::Success).await;
//!             assert_eq!(decision.remaining, 59);
//!         }
//!         Checked::Denied(denial) => {
//!             println!("denied, retry after {:?}", denial.decision.retry_after);
//!         }
//!     }
//! }
//! ```

pub mod admin;
pub mod anomaly;
pub mod clock;
pub mod config;
pub mod decision;
pub mod error;
pub mod key;
pub mod limiter;
pub mod middleware;
pub mod prelude;
pub mod presets;
pub mod store;
pub mod tiers;

// Re-exports
pub use config::{DenyResponse, Limit, RateLimitConfig};
pub use decision::Decision;
pub use error::{BoxError, ConfigError};
pub use key::RequestContext;
pub use limiter::{Admission, Checked, Denial, RateLimiter, RequestOutcome};
pub use store::{CounterStore, InMemoryCounterStore};
