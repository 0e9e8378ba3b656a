use std::time::Duration;

use async_trait::async_trait;

use crate::config::RetryPolicy;

/// How an attempt's status code feeds the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Ok,
    /// Rate limiting or a server-side error.
    Transient,
    Fatal,
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => StatusClass::Ok,
            429 => StatusClass::Transient,
            s if s >= 500 => StatusClass::Transient,
            _ => StatusClass::Fatal,
        }
    }
}

/// Call-scoped retry bookkeeping. Never shared between `submit` calls.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempts_remaining: u32,
    current_delay: Duration,
    multiplier: f64,
}

impl RetryState {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempts_remaining: policy.max_attempts.max(1),
            current_delay: policy.initial_delay,
            multiplier: policy.backoff_multiplier.max(1.0),
        }
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Consumes one attempt. Returns false once the budget is spent.
    pub fn begin_attempt(&mut self) -> bool {
        if self.attempts_remaining == 0 {
            return false;
        }
        self.attempts_remaining -= 1;
        true
    }

    /// Delay to wait before the next attempt, or `None` when none are left.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts_remaining == 0 {
            return None;
        }
        let delay = self.current_delay;
        let next_ms = (self.current_delay.as_millis() as f64 * self.multiplier).round();
        self.current_delay = Duration::from_millis(next_ms.min(u64::MAX as f64) as u64);
        Some(delay)
    }
}

/// Waits out the backoff between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
