use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::warn;

use crate::error::ErrorResponse;

/// Shared quota for the state-changing routes
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimitLayer {
    /// `requests` per minute, all of them available as an initial burst.
    /// A zero quota is raised to one.
    pub fn per_minute(requests: u32) -> Self {
        let burst = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        RateLimitLayer {
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(burst))),
        }
    }

    pub fn check(&self) -> Result<(), Response> {
        match self.limiter.check() {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!("🚦 Write rate limit exceeded");
                let body = Json(ErrorResponse {
                    error: "Rate limit exceeded. Please try again later.".to_string(),
                    error_code: "RATE_LIMITED".to_string(),
                });
                Err((StatusCode::TOO_MANY_REQUESTS, body).into_response())
            }
        }
    }
}

pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimitLayer>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, Response> {
    rate_limit.check()?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_reject() {
        let limiter = RateLimitLayer::per_minute(2);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());

        let rejected = limiter.check().unwrap_err();
        assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
