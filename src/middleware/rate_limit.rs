//! Rate limiting middleware
//!
//! Login attempts are limited per username so passwords cannot be guessed
//! at network speed.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::warn;

use crate::utils::errors::{MemberHubError, Result};

/// Keys tracked before stale ones are dropped
const RETAIN_THRESHOLD: usize = 10_000;

/// Keyed limiter for login attempts
#[derive(Clone)]
pub struct LoginRateLimiter {
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
}

impl LoginRateLimiter {
    /// Allow `attempts_per_minute` attempts for every username
    pub fn new(attempts_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(attempts_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
        }
    }

    /// Count one attempt for `username`
    pub fn check(&self, username: &str) -> Result<()> {
        if self.limiter.len() > RETAIN_THRESHOLD {
            self.limiter.retain_recent();
        }

        let key = username.trim().to_lowercase();
        match self.limiter.check_key(&key) {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(username = %key, "Login rate limit exceeded");
                Err(MemberHubError::RateLimitExceeded)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_limits_per_username() {
        let limiter = LoginRateLimiter::new(2);
        assert!(limiter.check("pablo").is_ok());
        assert!(limiter.check("Pablo ").is_ok());
        assert_matches!(limiter.check("pablo"), Err(MemberHubError::RateLimitExceeded));
        assert!(limiter.check("anna").is_ok());
    }

    #[test]
    fn test_zero_attempts_still_allows_one() {
        let limiter = LoginRateLimiter::new(0);
        assert!(limiter.check("pablo").is_ok());
        assert!(limiter.check("pablo").is_err());
    }
}
