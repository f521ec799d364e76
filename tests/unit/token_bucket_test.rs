//! Unit tests for the token bucket limiter on a paused clock

use ramadan_ingest::models::TokenBucketConfig;
use ramadan_ingest::services::TokenBucketLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn bucket(capacity: f64, refill_rate: f64, min_wait_ms: u64) -> TokenBucketLimiter {
    TokenBucketLimiter::new(TokenBucketConfig {
        capacity,
        refill_rate,
        min_wait_time: Duration::from_millis(min_wait_ms),
    })
}

#[tokio::test(start_paused = true)]
async fn test_sixth_request_waits_for_refill() {
    let limiter = bucket(5.0, 1.0, 500);
    let start = Instant::now();
    let mut admitted_at = Vec::new();

    for _ in 0..6 {
        limiter.acquire().await;
        admitted_at.push(start.elapsed());
    }

    // The first five ride the initial burst
    assert!(admitted_at[..5].iter().all(|t| *t == Duration::ZERO));
    // The sixth needs one whole token at 1 token/s
    assert!(admitted_at[5] >= Duration::from_secs(1));
    assert!(admitted_at[5] < Duration::from_millis(1100));
}

#[tokio::test(start_paused = true)]
async fn test_min_wait_applies_to_partial_tokens() {
    let limiter = bucket(1.0, 1.0, 500);
    limiter.acquire().await;

    // 0.9 tokens accumulated; the deficit alone would only need 100ms
    tokio::time::advance(Duration::from_millis(900)).await;
    let start = Instant::now();
    limiter.acquire().await;

    assert!(start.elapsed() >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn test_admissions_never_exceed_rate() {
    let limiter = Arc::new(bucket(2.0, 4.0, 0));
    let start = Instant::now();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            })
        })
        .collect();

    let mut times = Vec::new();
    for handle in handles {
        times.push(handle.await.unwrap());
    }

    // 2 burst tokens, then 8 more at 4 tokens/s
    let last = times.iter().max().unwrap();
    assert!(last.duration_since(start) >= Duration::from_millis(1990));
    assert_eq!(limiter.stats().total_requests, 10);
}

#[tokio::test(start_paused = true)]
async fn test_tokens_refill_over_time() {
    let limiter = bucket(10.0, 2.0, 0);
    limiter.acquire_many(10).await;
    let drained = limiter.stats().tokens;

    tokio::time::advance(Duration::from_secs(2)).await;
    let refilled = limiter.stats().tokens;

    assert!(refilled > drained);
    assert!((refilled - 4.0).abs() < 0.01);
}
