//! Token bucket admission control for outbound upstream calls.
//!
//! Tokens are a continuous quantity refilled in proportion to elapsed time.
//! Acquisitions are serialized through an async FIFO mutex that is held
//! across the wait, so two callers can never both spend the same fractional
//! surplus.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::TokenBucketConfig;

/// Float slack so a wait computed to the nanosecond does not trigger a second sleep
const EPSILON: f64 = 1e-9;

/// Longest single wait, whatever the refill rate
const MAX_WAIT: Duration = Duration::from_secs(3600);

/// Read-only limiter counters. Never used to bypass `acquire`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterStats {
    pub tokens: f64,
    pub total_requests: u64,
    pub total_wait_time: Duration,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    total_requests: u64,
    total_wait_time: Duration,
}

impl BucketState {
    fn refill(&mut self, config: &TokenBucketConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.refill_rate).min(config.capacity);
        self.last_refill = now;
    }

    /// Consumes one token if available
    fn try_take(&mut self) -> bool {
        if self.tokens + EPSILON >= 1.0 {
            self.tokens = (self.tokens - 1.0).max(0.0);
            self.total_requests += 1;
            true
        } else {
            false
        }
    }
}

pub struct TokenBucketLimiter {
    config: TokenBucketConfig,
    gate: tokio::sync::Mutex<()>,
    state: Mutex<BucketState>,
}

impl TokenBucketLimiter {
    /// Creates a limiter whose bucket starts full
    pub fn new(config: TokenBucketConfig) -> Self {
        Self {
            config,
            gate: tokio::sync::Mutex::new(()),
            state: Mutex::new(BucketState {
                tokens: config.capacity,
                last_refill: Instant::now(),
                total_requests: 0,
                total_wait_time: Duration::ZERO,
            }),
        }
    }

    pub fn config(&self) -> &TokenBucketConfig {
        &self.config
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Time until one token is available, never shorter than `min_wait_time`
    fn wait_for(&self, tokens: f64) -> Duration {
        let deficit = (1.0 - tokens).max(0.0);
        let secs = deficit / self.config.refill_rate;
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_WAIT)
            .min(MAX_WAIT)
            .max(self.config.min_wait_time)
    }

    /// Waits until at least one token is available, then consumes it
    pub async fn acquire(&self) {
        let _turn = self.gate.lock().await;

        loop {
            let wait = {
                let mut state = self.lock_state();
                state.refill(&self.config, Instant::now());
                if state.try_take() {
                    return;
                }
                let wait = self.wait_for(state.tokens);
                state.total_wait_time += wait;
                wait
            };

            log::debug!("Rate limiter waiting {:?} for a token", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// `n` sequential single acquisitions, not one larger debit
    pub async fn acquire_many(&self, n: usize) {
        for _ in 0..n {
            self.acquire().await;
        }
    }

    pub fn stats(&self) -> LimiterStats {
        let mut state = self.lock_state();
        state.refill(&self.config, Instant::now());
        LimiterStats {
            tokens: state.tokens,
            total_requests: state.total_requests,
            total_wait_time: state.total_wait_time,
        }
    }
}
