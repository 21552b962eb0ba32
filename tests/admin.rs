#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use turnstile::admin::AdminHandle;
    use turnstile::{
        Checked, InMemoryCounterStore, RateLimitConfig, RateLimiter, RequestContext,
        RequestOutcome,
    };

    fn limiter(store: Arc<InMemoryCounterStore>) -> RateLimiter<InMemoryCounterStore> {
        let config = RateLimitConfig::builder()
            .window(Duration::from_secs(60))
            .limit(2)
            .key_prefix("api:")
            .build()
            .expect("valid config");
        RateLimiter::new(config, store)
    }

    async fn exhaust(limiter: &RateLimiter<InMemoryCounterStore>, ctx: &RequestContext) {
        for _ in 0..2 {
            match limiter.check(ctx).await {
                Checked::Allowed(admission) => {
                    admission.settle(RequestOutcome::Success).await;
                }
                Checked::Denied(_) => panic!("quota should not be spent yet"),
            }
        }
        assert!(!limiter.check(ctx).await.is_allowed());
    }

    #[tokio::test]
    async fn reset_makes_the_next_request_first_in_window() {
        let store = Arc::new(InMemoryCounterStore::new());
        let limiter = limiter(store.clone());
        let admin = AdminHandle::new(store);
        let ctx = RequestContext::for_principal("42");

        exhaust(&limiter, &ctx).await;
        assert!(admin.reset_limit("api:user:42").await.unwrap());

        let decision = match limiter.check(&ctx).await {
            Checked::Allowed(admission) => admission.settle(RequestOutcome::Success).await,
            Checked::Denied(_) => panic!("reset should reopen the window"),
        };
        assert_eq!(decision.remaining, 1); // count restarted at 1
    }

    #[tokio::test]
    async fn status_tracks_usage_without_counting() {
        let store = Arc::new(InMemoryCounterStore::new());
        let limiter = limiter(store.clone());
        let admin = AdminHandle::new(store);
        let ctx = RequestContext::for_principal("42");

        let before = admin.status("api:user:42").await.unwrap();
        assert_eq!(before.count, 0);
        assert_eq!(before.ttl, Duration::ZERO);
        assert!(before.reset_at.is_none());

        match limiter.check(&ctx).await {
            Checked::Allowed(admission) => {
                admission.settle(RequestOutcome::Success).await;
            }
            Checked::Denied(_) => panic!("fresh key should admit"),
        }

        let after = admin.status("api:user:42").await.unwrap();
        assert_eq!(after.count, 1);
        assert!(after.ttl > Duration::ZERO);
        assert!(after.reset_at.is_some());

        // The probe itself consumed nothing.
        let probed = admin.status("api:user:42").await.unwrap();
        assert_eq!(probed.count, 1);
    }
}
