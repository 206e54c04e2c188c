//! Per-client rate limiting using a keyed token bucket

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use super::guard::ClientIp;
use crate::AppState;
use vejovis_common::{
    config::RateLimitConfig,
    errors::{AppError, Result},
};

/// Token buckets keyed by client IP
pub type KeyedLimiter = DefaultKeyedRateLimiter<String>;

/// Create the limiter, or `None` when rate limiting is disabled
pub fn create_rate_limiter(config: &RateLimitConfig) -> Result<Option<Arc<KeyedLimiter>>> {
    if !config.enabled {
        return Ok(None);
    }

    let per_second = NonZeroU32::new(config.requests_per_second)
        .ok_or_else(|| AppError::configuration("rate_limit.requests_per_second must be positive"))?;
    let burst = NonZeroU32::new(config.burst)
        .ok_or_else(|| AppError::configuration("rate_limit.burst must be positive"))?;

    let quota = Quota::per_second(per_second).allow_burst(burst);
    Ok(Some(Arc::new(RateLimiter::keyed(quota))))
}

/// Rate limiting middleware. Runs after the guard, which attaches the client IP.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    if let Some(ref limiter) = state.limiter {
        let key = request
            .extensions()
            .get::<ClientIp>()
            .map_or_else(|| "unknown".to_string(), |ip| ip.0.clone());

        if limiter.check_key(&key).is_err() {
            tracing::warn!(client_ip = %key, "Rate limit exceeded");
            return Err(AppError::RateLimited {
                limit: state.config.rate_limit.requests_per_second,
            });
        }
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_by_default() {
        assert!(create_rate_limiter(&RateLimitConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_buckets_are_per_key() {
        let config = RateLimitConfig {
            enabled: true,
            requests_per_second: 1,
            burst: 2,
        };
        let limiter = create_rate_limiter(&config).unwrap().unwrap();
        let a = "203.0.113.1".to_string();
        let b = "203.0.113.2".to_string();

        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_ok());
        assert!(limiter.check_key(&a).is_err());
        assert!(limiter.check_key(&b).is_ok());
    }

    #[test]
    fn test_zero_quota_rejected() {
        let config = RateLimitConfig {
            enabled: true,
            requests_per_second: 0,
            burst: 1,
        };
        assert!(create_rate_limiter(&config).is_err());
    }
}
