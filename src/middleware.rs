//! Tower middleware enforcing an admission policy around a service.
//!
//! The layer does not know how limiting works, only that it should ask a
//! [`RateLimiter`] before forwarding and settle the admission afterwards.
//! Response-header injection is transport-specific and left to the embedding
//! layer; the settled [`Decision`] is logged at trace level.
//!
//! [`Decision`]: crate::decision::Decision

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower_layer::Layer;
use tower_service::Service;
use tracing::trace;

use crate::key::RequestContext;
use crate::limiter::{Checked, Denial, RateLimiter, RequestOutcome};
use crate::store::CounterStore;

/// Errors surfaced by [`AdmissionService`].
#[derive(thiserror::Error, Debug)]
pub enum AdmissionError<E> {
    /// The request was denied; the payload carries the response to send.
    #[error("rate limit exceeded")]
    Denied(Box<Denial>),
    /// The wrapped service failed (the attempt was still settled).
    #[error("{0}")]
    Inner(E),
}

impl<E> AdmissionError<E> {
    /// Check if this error is a denial.
    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied(_))
    }

    /// Borrow the denial if present.
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Self::Denied(denial) => Some(denial),
            Self::Inner(_) => None,
        }
    }

    /// Get the inner error if this is an Inner variant.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Denied(_) => None,
        }
    }
}

/// A layer that guards a service with a [`RateLimiter`].
///
/// `context` extracts the [`RequestContext`] from each request; the host
/// application decides what identity material a request carries.
pub struct AdmissionLayer<S: CounterStore + 'static, F> {
    limiter: Arc<RateLimiter<S>>,
    context: Arc<F>,
}

impl<S: CounterStore + 'static, F> AdmissionLayer<S, F> {
    /// Create a new admission layer.
    pub fn new(limiter: RateLimiter<S>, context: F) -> Self {
        Self { limiter: Arc::new(limiter), context: Arc::new(context) }
    }
}

impl<S: CounterStore + 'static, F> Clone for AdmissionLayer<S, F> {
    fn clone(&self) -> Self {
        Self { limiter: Arc::clone(&self.limiter), context: Arc::clone(&self.context) }
    }
}

impl<Svc, S, F> Layer<Svc> for AdmissionLayer<S, F>
where
    S: CounterStore + 'static,
{
    type Service = AdmissionService<Svc, S, F>;

    fn layer(&self, service: Svc) -> Self::Service {
        AdmissionService {
            inner: service,
            limiter: Arc::clone(&self.limiter),
            context: Arc::clone(&self.context),
        }
    }
}

/// Middleware service that enforces an admission policy.
pub struct AdmissionService<Svc, S: CounterStore + 'static, F> {
    inner: Svc,
    limiter: Arc<RateLimiter<S>>,
    context: Arc<F>,
}

impl<Svc: Clone, S: CounterStore + 'static, F> Clone for AdmissionService<Svc, S, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            context: Arc::clone(&self.context),
        }
    }
}

impl<Svc, S, F, Req> Service<Req> for AdmissionService<Svc, S, F>
where
    Svc: Service<Req> + Clone + Send + 'static,
    Svc::Future: Send + 'static,
    Svc::Response: Send + 'static,
    Svc::Error: Send + 'static,
    S: CounterStore + 'static,
    F: Fn(&Req) -> RequestContext,
    Req: Send + 'static,
{
    type Response = Svc::Response;
    type Error = AdmissionError<Svc::Error>;
    // Boxed future, matching the storage-backed check's dynamic shape.
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(AdmissionError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let limiter = Arc::clone(&self.limiter);
        let mut inner = self.inner.clone();
        let ctx = (self.context.as_ref())(&req);

        Box::pin(async move {
            match limiter.check(&ctx).await {
                Checked::Allowed(admission) => {
                    let result = inner.call(req).await;
                    let outcome = if result.is_ok() {
                        RequestOutcome::Success
                    } else {
                        RequestOutcome::Failure
                    };
                    let decision = admission.settle(outcome).await;
                    trace!(
                        target: "turnstile::middleware",
                        remaining = decision.remaining,
                        "request settled"
                    );
                    result.map_err(AdmissionError::Inner)
                }
                Checked::Denied(denial) => Err(AdmissionError::Denied(Box::new(denial))),
            }
        })
    }
}
