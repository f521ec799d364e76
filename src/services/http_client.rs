//! Rate-gated HTTP client with timeout, exponential backoff and 429 handling.
//!
//! Every network attempt first passes through the run's
//! [`TokenBucketLimiter`]. Retryable statuses back off exponentially with
//! ±20% jitter; HTTP 429 honours `Retry-After` and backs off harder, since the
//! upstream's own signal is authoritative.

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::token_bucket::TokenBucketLimiter;
use crate::error::FetchError;

/// Upper bound for any 429-driven delay (before jitter)
const MAX_RATE_LIMIT_DELAY: Duration = Duration::from_secs(30);

/// 429 delays are this many times the larger of `Retry-After` and the backoff
const RATE_LIMIT_FACTOR: u32 = 3;

/// Maximum length of the response body preview included in error logs
const BODY_PREVIEW_LEN: usize = 300;

/// Retry behaviour for upstream calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            retryable_statuses: vec![408, 429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.retryable_statuses.contains(&status.as_u16())
    }

    /// `min(current × multiplier, max_delay)`
    pub fn next_backoff(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff_multiplier.max(1.0)).min(self.max_delay)
    }
}

impl FetchError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. }
            | FetchError::RateLimited { .. }
            | FetchError::TransientUpstream { .. } => true,
            FetchError::Network(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            FetchError::PermanentUpstream { .. }
            | FetchError::Decode(_)
            | FetchError::RetryExhausted { .. }
            | FetchError::Cancelled => false,
        }
    }
}

/// Delay before the next attempt, before jitter.
///
/// 429: `max(retry_after, current) × 3`, capped at 30s. Everything else:
/// `min(current × multiplier, max_delay)`.
pub fn compute_delay(error: &FetchError, current: Duration, policy: &RetryPolicy) -> Duration {
    match error {
        FetchError::RateLimited { retry_after } => retry_after
            .unwrap_or(Duration::ZERO)
            .max(current)
            .saturating_mul(RATE_LIMIT_FACTOR)
            .min(MAX_RATE_LIMIT_DELAY),
        _ => policy.next_backoff(current),
    }
}

/// Applies ±20% jitter, never going below `floor`
pub fn apply_jitter(delay: Duration, floor: Duration) -> Duration {
    let factor: f64 = rand::rng().random_range(0.8..=1.2);
    delay.mul_f64(factor).max(floor)
}

/// Jittered delay before the next attempt.
///
/// A 429 never waits less than its `Retry-After`, unless that exceeds the
/// 30s cap, in which case the cap is the floor.
pub fn retry_delay(error: &FetchError, current: Duration, policy: &RetryPolicy) -> Duration {
    let floor = match error {
        FetchError::RateLimited { retry_after } => retry_after
            .unwrap_or(Duration::ZERO)
            .min(MAX_RATE_LIMIT_DELAY),
        _ => Duration::ZERO,
    };
    apply_jitter(compute_delay(error, current, policy), floor)
}

/// Parses a `Retry-After` value: delta-seconds or an HTTP-date
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

pub struct RetryingHttpClient {
    http: reqwest::Client,
    limiter: Arc<TokenBucketLimiter>,
    timeout: Duration,
}

impl RetryingHttpClient {
    pub fn new(http: reqwest::Client, limiter: Arc<TokenBucketLimiter>, timeout: Duration) -> Self {
        Self {
            http,
            limiter,
            timeout,
        }
    }

    pub fn limiter(&self) -> &TokenBucketLimiter {
        &self.limiter
    }

    /// One rate-gated attempt under a hard timeout.
    ///
    /// Dropping the send future on timeout aborts the underlying request.
    async fn send_once(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        self.limiter.acquire().await;

        match tokio::time::timeout(self.timeout, self.http.get(url).send()).await {
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }),
            Ok(Err(e)) if e.is_timeout() => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }),
            Ok(Err(e)) => Err(FetchError::Network(e)),
            Ok(Ok(response)) => Ok(response),
        }
    }

    /// GETs `url`, retrying transient failures according to `policy`.
    ///
    /// Non-retryable statuses return at once: 2xx/3xx as `Ok`, anything else
    /// as [`FetchError::PermanentUpstream`].
    pub async fn fetch_with_retry(
        &self,
        url: &str,
        policy: &RetryPolicy,
    ) -> Result<reqwest::Response, FetchError> {
        let mut current_delay = policy.initial_delay;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let error = match self.send_once(url).await {
                Ok(response) => {
                    let status = response.status();
                    if !policy.is_retryable_status(status) {
                        if status.is_success() || status.is_redirection() {
                            return Ok(response);
                        }
                        log::warn!("HTTP {} from {} (not retried)", status, url);
                        return Err(FetchError::PermanentUpstream {
                            status: status.as_u16(),
                        });
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        let retry_after = response
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| parse_retry_after(v, Utc::now()));
                        FetchError::RateLimited { retry_after }
                    } else {
                        FetchError::TransientUpstream {
                            status: status.as_u16(),
                        }
                    }
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            if attempt > policy.max_retries {
                log::error!("Giving up on {} after {} attempts: {}", url, attempt, error);
                return Err(FetchError::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            let delay = retry_delay(&error, current_delay, policy);
            current_delay = policy.next_backoff(current_delay);

            log::warn!(
                "{} (attempt {}/{}), retrying {} in {:?}",
                error,
                attempt,
                policy.max_retries + 1,
                url,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// [`fetch_with_retry`](Self::fetch_with_retry) and decode the body as JSON
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        policy: &RetryPolicy,
    ) -> Result<T, FetchError> {
        let response = self.fetch_with_retry(url, policy).await?;
        let status = response.status();
        let text = response.text().await?;

        serde_json::from_str(&text).map_err(|e| {
            let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
            log::error!(
                "JSON parse failed for {} (status {}): {}\n  body preview: {}",
                url,
                status,
                e,
                preview
            );
            FetchError::Decode(format!("{} (received {} bytes)", e, text.len()))
        })
    }
}
