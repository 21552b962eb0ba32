#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use turnstile::clock::ManualClock;
    use turnstile::{
        Checked, CounterStore, Decision, InMemoryCounterStore, RateLimitConfig, RateLimiter,
        RequestContext, RequestOutcome,
    };

    fn config(window: Duration, max: u64) -> RateLimitConfig {
        RateLimitConfig::builder()
            .window(window)
            .limit(max)
            .key_prefix("test:")
            .build()
            .expect("valid config")
    }

    async fn attempt(
        limiter: &RateLimiter<InMemoryCounterStore>,
        ctx: &RequestContext,
        outcome: RequestOutcome,
    ) -> Decision {
        match limiter.check(ctx).await {
            Checked::Allowed(admission) => admission.settle(outcome).await,
            Checked::Denied(denial) => denial.decision,
        }
    }

    #[tokio::test]
    async fn exactly_max_requests_admitted_per_window() {
        let limiter = RateLimiter::new(
            config(Duration::from_secs(60), 5),
            Arc::new(InMemoryCounterStore::new()),
        );
        let ctx = RequestContext::for_addr("203.0.113.7");

        for _ in 0..5 {
            let decision = attempt(&limiter, &ctx, RequestOutcome::Success).await;
            assert!(decision.allowed);
        }
        let decision = attempt(&limiter, &ctx, RequestOutcome::Success).await;
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn remaining_counts_down_and_retry_after_is_window_seconds() {
        // Three sequential requests: remaining 2, 1, 0; the fourth is denied
        // with a 60 second retry hint.
        let limiter = RateLimiter::new(
            config(Duration::from_secs(60), 3),
            Arc::new(InMemoryCounterStore::new()),
        );
        let ctx = RequestContext::for_addr("203.0.113.7");

        for expected_remaining in [2, 1, 0] {
            let decision = attempt(&limiter, &ctx, RequestOutcome::Success).await;
            assert!(decision.allowed);
            assert_eq!(decision.limit, 3);
            assert_eq!(decision.remaining, expected_remaining);
            assert!(decision.reset_at.is_some());
            assert!(decision.retry_after.is_none());
        }

        let denied = attempt(&limiter, &ctx, RequestOutcome::Success).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after, Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn deny_response_carries_retry_metadata() {
        let limiter = RateLimiter::new(
            config(Duration::from_secs(60), 1),
            Arc::new(InMemoryCounterStore::new()),
        );
        let ctx = RequestContext::for_addr("203.0.113.7");

        attempt(&limiter, &ctx, RequestOutcome::Success).await;
        let denial = match limiter.check(&ctx).await {
            Checked::Denied(denial) => denial,
            Checked::Allowed(_) => panic!("expected denial"),
        };

        assert_eq!(denial.response.status, 429);
        assert_eq!(denial.response.body["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(denial.response.body["retryAfter"], 60);
        assert!(denial
            .response
            .headers
            .contains(&("Retry-After".to_string(), "60".to_string())));
        let headers = denial.decision.headers();
        assert!(headers.contains(&("X-RateLimit-Remaining", "0".to_string())));
    }

    #[tokio::test]
    async fn distinct_keys_do_not_interfere() {
        // Two addresses, ceiling 2 each: both get their own quota.
        let limiter = RateLimiter::new(
            config(Duration::from_secs(60), 2),
            Arc::new(InMemoryCounterStore::new()),
        );
        let a = RequestContext::for_addr("203.0.113.1");
        let b = RequestContext::for_addr("203.0.113.2");

        for _ in 0..2 {
            assert!(attempt(&limiter, &a, RequestOutcome::Success).await.allowed);
            assert!(attempt(&limiter, &b, RequestOutcome::Success).await.allowed);
        }
        assert!(!attempt(&limiter, &a, RequestOutcome::Success).await.allowed);
        assert!(!attempt(&limiter, &b, RequestOutcome::Success).await.allowed);
    }

    #[tokio::test]
    async fn window_expiry_starts_fresh() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(InMemoryCounterStore::with_clock(clock.clone()));
        let limiter = RateLimiter::with_clock(
            config(Duration::from_secs(60), 2),
            store,
            clock.clone(),
        );
        let ctx = RequestContext::for_addr("203.0.113.7");

        assert!(attempt(&limiter, &ctx, RequestOutcome::Success).await.allowed);
        assert!(attempt(&limiter, &ctx, RequestOutcome::Success).await.allowed);
        assert!(!attempt(&limiter, &ctx, RequestOutcome::Success).await.allowed);

        clock.advance(Duration::from_secs(61));

        let decision = attempt(&limiter, &ctx, RequestOutcome::Success).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1); // first in a fresh window
    }

    #[tokio::test]
    async fn ttl_is_not_extended_by_later_requests() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(InMemoryCounterStore::with_clock(clock.clone()));
        let limiter = RateLimiter::with_clock(
            config(Duration::from_secs(60), 10),
            store,
            clock.clone(),
        );
        let ctx = RequestContext::for_addr("203.0.113.7");

        let first = attempt(&limiter, &ctx, RequestOutcome::Success).await;
        clock.advance(Duration::from_secs(30));
        let second = attempt(&limiter, &ctx, RequestOutcome::Success).await;

        // Both decisions point at the same window expiry.
        assert_eq!(first.reset_at, second.reset_at);
    }

    #[tokio::test]
    async fn concurrent_burst_admits_exactly_the_ceiling() {
        // 2N simultaneous requests against a fresh key with ceiling N.
        const N: u64 = 5;
        let limiter = Arc::new(RateLimiter::new(
            config(Duration::from_secs(60), N),
            Arc::new(InMemoryCounterStore::new()),
        ));

        let mut handles = Vec::new();
        for _ in 0..(2 * N) {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                let ctx = RequestContext::for_addr("203.0.113.7");
                match limiter.check(&ctx).await {
                    Checked::Allowed(admission) => {
                        admission.settle(RequestOutcome::Success).await;
                        true
                    }
                    Checked::Denied(_) => false,
                }
            }));
        }

        let mut admitted = 0u64;
        let mut denied = 0u64;
        for handle in handles {
            if handle.await.expect("task") {
                admitted += 1;
            } else {
                denied += 1;
            }
        }
        assert_eq!(admitted, N);
        assert_eq!(denied, N);

        // No lost or duplicated increments.
        let count = limiter.store().get("test:ip:203.0.113.7").await.unwrap();
        assert_eq!(count, Some(N));
    }

    #[tokio::test]
    async fn failed_attempts_consume_quota_successes_do_not() {
        // Login-style policy: only failures count.
        let limiter = RateLimiter::new(
            turnstile::presets::login_attempts(),
            Arc::new(InMemoryCounterStore::new()),
        );
        let ctx = RequestContext::for_principal("alice");

        for _ in 0..4 {
            let decision = attempt(&limiter, &ctx, RequestOutcome::Failure).await;
            assert!(decision.allowed);
        }

        // A correct password after four failures is admitted and consumes
        // nothing.
        let success = attempt(&limiter, &ctx, RequestOutcome::Success).await;
        assert!(success.allowed);
        assert_eq!(success.remaining, 1);

        // The fifth failure exhausts the quota; the attempt after it is
        // denied.
        assert!(attempt(&limiter, &ctx, RequestOutcome::Failure).await.allowed);
        let denied = attempt(&limiter, &ctx, RequestOutcome::Failure).await;
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Some(Duration::from_secs(900)));
    }

    #[tokio::test]
    async fn tiered_callers_get_scaled_ceilings() {
        let config = RateLimitConfig::builder()
            .window(Duration::from_secs(60))
            .dynamic_limit(turnstile::tiers::TieredLimit::new(2))
            .key_prefix("api:")
            .build()
            .expect("valid config");
        let limiter = RateLimiter::new(config, Arc::new(InMemoryCounterStore::new()));

        let basic = RequestContext::for_principal("b").with_attribute("tier", "basic");
        for _ in 0..4 {
            assert!(attempt(&limiter, &basic, RequestOutcome::Success).await.allowed);
        }
        assert!(!attempt(&limiter, &basic, RequestOutcome::Success).await.allowed);

        // A premium caller is still far from its x10 ceiling.
        let premium = RequestContext::for_principal("p").with_attribute("tier", "premium");
        for _ in 0..20 {
            assert!(attempt(&limiter, &premium, RequestOutcome::Success).await.allowed);
        }
        assert!(!attempt(&limiter, &premium, RequestOutcome::Success).await.allowed);
    }

    #[tokio::test]
    async fn dropped_admission_still_counts_as_a_failed_attempt() {
        let limiter = RateLimiter::new(
            config(Duration::from_secs(60), 5),
            Arc::new(InMemoryCounterStore::new()),
        );
        let ctx = RequestContext::for_addr("203.0.113.7");

        match limiter.check(&ctx).await {
            Checked::Allowed(admission) => {
                assert_eq!(admission.limit(), 5);
                drop(admission); // aborted downstream
            }
            Checked::Denied(_) => panic!("fresh key should admit"),
        }
        // The deferred count runs on the spawned task.
        tokio::task::yield_now().await;

        let count = limiter.store().get("test:ip:203.0.113.7").await.unwrap();
        assert_eq!(count, Some(1));
    }
}
