//! Request rate limiting for the LLM client.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;

/// Token-bucket limiter shared by all requests through one client.
pub struct RequestRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RequestRateLimiter {
    /// `requests_per_second` is rounded up to at least one.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second.max(1)).expect("non-zero by construction");
        Self { limiter: RateLimiter::direct(Quota::per_second(rps)) }
    }

    /// Wait until a request slot is available.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }
}
