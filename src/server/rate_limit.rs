use std::net::IpAddr;
use std::num::NonZeroU32;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};

use crate::core::config::RateLimitSettings;
use crate::core::errors::ApiError;

/// Per-client admission control for the recommendation endpoint.
///
/// A client may spend `max_requests` at once. One request's worth of capacity comes
/// back per full `window`, so no window ever admits more than `max_requests`.
pub struct ClientRateLimiter {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
}

impl ClientRateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        let burst = NonZeroU32::new(settings.max_requests).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(settings.window)
            .unwrap_or_else(|| Quota::per_minute(NonZeroU32::MIN))
            .allow_burst(burst);
        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    pub fn check(&self, client: IpAddr) -> Result<(), ApiError> {
        self.limiter.check_key(&client).map_err(|_| {
            tracing::warn!("rate limit exceeded for {}", client);
            ApiError::TooManyRequests
        })
    }

    /// Drops state for clients whose quota has fully refilled.
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}
