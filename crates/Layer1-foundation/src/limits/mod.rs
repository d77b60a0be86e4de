//! Rate limiting - 도구별 호출 횟수 제한
//!
//! `RateLimiter::check` 는 한도를 넘으면 `Error::RateLimited` 를 반환하고,
//! 통과한 호출만 window 에 기록한다.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 최대 `max_calls` 회 / `window_ms`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_calls: u32,
    pub window_ms: u64,
}

impl RateLimitPolicy {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls,
            window_ms: window.as_millis() as u64,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, tool_id: &str, policy: &RateLimitPolicy) -> Result<()>;
}

/// Sliding-window limiter keyed by tool id
#[derive(Debug, Default)]
pub struct SlidingWindowLimiter {
    calls: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_at(&self, tool_id: &str, policy: &RateLimitPolicy, now: Instant) -> Result<()> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))?;
        let window = calls.entry(tool_id.to_string()).or_default();

        let span = policy.window();
        while let Some(front) = window.front() {
            if now.saturating_duration_since(*front) >= span {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= policy.max_calls as usize {
            return Err(Error::RateLimited(format!(
                "{} allows {} calls per {:?}",
                tool_id,
                policy.max_calls,
                span
            )));
        }

        window.push_back(now);
        Ok(())
    }

    /// 기록 초기화
    pub fn reset(&self, tool_id: &str) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.remove(tool_id);
        }
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn check(&self, tool_id: &str, policy: &RateLimitPolicy) -> Result<()> {
        self.check_at(tool_id, policy, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breach_within_window() {
        let limiter = SlidingWindowLimiter::new();
        let policy = RateLimitPolicy::new(2, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.check_at("calc", &policy, t0).is_ok());
        assert!(limiter.check_at("calc", &policy, t0).is_ok());
        let err = limiter.check_at("calc", &policy, t0).unwrap_err();
        assert_eq!(err.kind(), "rate_limited");

        // other keys are independent
        assert!(limiter.check_at("other", &policy, t0).is_ok());
    }

    #[test]
    fn test_window_slides() {
        let limiter = SlidingWindowLimiter::new();
        let policy = RateLimitPolicy::new(1, Duration::from_millis(100));
        let t0 = Instant::now();

        assert!(limiter.check_at("calc", &policy, t0).is_ok());
        assert!(limiter.check_at("calc", &policy, t0 + Duration::from_millis(50)).is_err());
        assert!(limiter
            .check_at("calc", &policy, t0 + Duration::from_millis(150))
            .is_ok());
    }

    #[test]
    fn test_reset() {
        let limiter = SlidingWindowLimiter::new();
        let policy = RateLimitPolicy::new(1, Duration::from_secs(60));
        assert!(limiter.check("calc", &policy).is_ok());
        assert!(limiter.check("calc", &policy).is_err());
        limiter.reset("calc");
        assert!(limiter.check("calc", &policy).is_ok());
    }
}
