//! Proactive request throttling for GitLab hosts.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default requests per second against a single host.
///
/// Self-managed GitLab defaults to 2000 authenticated requests per minute;
/// a scan shares that budget with CI and users, so we stay well under it.
pub const DEFAULT_RPS: u32 = 10;

/// A shared, cloneable rate limiter backed by `governor`.
///
/// ```ignore
/// let limiter = ApiRateLimiter::new(10);
/// limiter.wait().await;
/// client.list_projects(&query).await?;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
    requests_per_second: u32,
}

impl ApiRateLimiter {
    /// Create a limiter allowing `requests_per_second` (minimum 1).
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
            requests_per_second: rps.get(),
        }
    }

    /// Build a limiter from a config value; `0` means unlimited.
    #[must_use]
    pub fn from_config(requests_per_second: u32) -> Option<Self> {
        (requests_per_second > 0).then(|| Self::new(requests_per_second))
    }

    #[must_use]
    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }

    /// Wait until the limiter admits another request.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter")
            .field("requests_per_second", &self.requests_per_second)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rps_is_clamped_to_one() {
        assert_eq!(ApiRateLimiter::new(0).requests_per_second(), 1);
    }

    #[test]
    fn from_config_disables_on_zero() {
        assert!(ApiRateLimiter::from_config(0).is_none());
        assert_eq!(
            ApiRateLimiter::from_config(25).map(|l| l.requests_per_second()),
            Some(25)
        );
    }

    #[tokio::test]
    async fn first_request_is_admitted_immediately() {
        let limiter = ApiRateLimiter::new(5);
        tokio::time::timeout(std::time::Duration::from_secs(1), limiter.wait())
            .await
            .expect("first permit should be immediate");
    }
}
