//! Rate limiting configuration for ingestion runs.
//!
//! A `RateLimitConfig` is owned by the caller and passed by value into a
//! single run. Durations travel over the wire as milliseconds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Slowest accepted refill: one token every 1000 seconds
pub const MIN_REFILL_RATE: f64 = 0.001;

/// Serde adapter for `Duration` as integer milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Token bucket parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBucketConfig {
    pub capacity: f64,
    /// Tokens added per second
    pub refill_rate: f64,
    #[serde(with = "duration_ms")]
    pub min_wait_time: Duration,
}

/// Throttling parameters for one ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Requests a district worker issues between cancellation checkpoints
    pub batch_size: usize,
    #[serde(with = "duration_ms")]
    pub inter_request_delay: Duration,
    #[serde(with = "duration_ms")]
    pub inter_district_delay: Duration,
    pub max_concurrent_districts: usize,
    pub token_bucket: TokenBucketConfig,
}

impl RateLimitConfig {
    /// Rejects configurations that would stall or divide by zero
    pub fn validate(&self) -> AppResult<()> {
        if self.batch_size == 0 {
            return Err(AppError::Validation("batchSize must be at least 1".to_string()));
        }
        if self.max_concurrent_districts == 0 {
            return Err(AppError::Validation(
                "maxConcurrentDistricts must be at least 1".to_string(),
            ));
        }
        if !(self.token_bucket.capacity >= 1.0) {
            return Err(AppError::Validation(
                "tokenBucket.capacity must be at least 1".to_string(),
            ));
        }
        let refill_rate = self.token_bucket.refill_rate;
        if !refill_rate.is_finite() || refill_rate < MIN_REFILL_RATE {
            return Err(AppError::Validation(format!(
                "tokenBucket.refillRate must be at least {}",
                MIN_REFILL_RATE
            )));
        }
        Ok(())
    }
}

/// Named, fixed rate limit presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitPreset {
    Conservative,
    Balanced,
    Aggressive,
    Fast,
    Turbo,
}

impl RateLimitPreset {
    pub const ALL: [RateLimitPreset; 5] = [
        RateLimitPreset::Conservative,
        RateLimitPreset::Balanced,
        RateLimitPreset::Aggressive,
        RateLimitPreset::Fast,
        RateLimitPreset::Turbo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RateLimitPreset::Conservative => "conservative",
            RateLimitPreset::Balanced => "balanced",
            RateLimitPreset::Aggressive => "aggressive",
            RateLimitPreset::Fast => "fast",
            RateLimitPreset::Turbo => "turbo",
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        // (batch, inter-request ms, inter-district ms, concurrency, capacity, refill/s, min wait ms)
        let (batch, request_ms, district_ms, concurrent, capacity, refill, min_wait_ms) =
            match self {
                RateLimitPreset::Conservative => (5, 1500, 3000, 1, 5.0, 0.5, 1000),
                RateLimitPreset::Balanced => (10, 800, 2000, 2, 10.0, 1.0, 500),
                RateLimitPreset::Aggressive => (20, 400, 1000, 3, 20.0, 2.0, 250),
                RateLimitPreset::Fast => (30, 200, 500, 4, 30.0, 4.0, 150),
                RateLimitPreset::Turbo => (50, 100, 250, 6, 50.0, 8.0, 100),
            };

        RateLimitConfig {
            batch_size: batch,
            inter_request_delay: Duration::from_millis(request_ms),
            inter_district_delay: Duration::from_millis(district_ms),
            max_concurrent_districts: concurrent,
            token_bucket: TokenBucketConfig {
                capacity,
                refill_rate: refill,
                min_wait_time: Duration::from_millis(min_wait_ms),
            },
        }
    }

    /// All presets keyed by name
    pub fn catalog() -> BTreeMap<&'static str, RateLimitConfig> {
        Self::ALL.iter().map(|p| (p.name(), p.config())).collect()
    }
}

impl std::fmt::Display for RateLimitPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for RateLimitPreset {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::Validation(format!("Unknown rate limit preset '{}'", s)))
    }
}
