//! Integration tests for the retrying HTTP client against a mock upstream
//!
//! These run on the real clock; delays are kept in the tens of milliseconds
//! except where `Retry-After` itself is under test.

use ramadan_ingest::error::FetchError;
use ramadan_ingest::models::TokenBucketConfig;
use ramadan_ingest::services::{RetryPolicy, RetryingHttpClient, TokenBucketLimiter};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::fixtures::quick_retry_policy;

fn client(timeout: Duration) -> RetryingHttpClient {
    let limiter = Arc::new(TokenBucketLimiter::new(TokenBucketConfig {
        capacity: 50.0,
        refill_rate: 50.0,
        min_wait_time: Duration::ZERO,
    }));
    RetryingHttpClient::new(reqwest::Client::new(), limiter, timeout)
}

fn url(server: &MockServer) -> String {
    format!("{}/timings", server.uri())
}

// =============================================================================
// Retry Behaviour
// =============================================================================

#[tokio::test]
async fn test_transient_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/timings"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/timings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(Duration::from_secs(2));
    let body: Value = client
        .fetch_json(&url(&server), &quick_retry_policy())
        .await
        .unwrap();

    assert_eq!(body["ok"], true);
    // Every attempt went through the limiter
    assert_eq!(client.limiter().stats().total_requests, 3);
}

#[tokio::test]
async fn test_permanent_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(Duration::from_secs(2))
        .fetch_with_retry(&url(&server), &quick_retry_policy())
        .await;

    assert!(matches!(
        result,
        Err(FetchError::PermanentUpstream { status: 404 })
    ));
}

#[tokio::test]
async fn test_retries_are_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        max_retries: 2,
        ..quick_retry_policy()
    };
    let result = client(Duration::from_secs(2))
        .fetch_with_retry(&url(&server), &policy)
        .await;

    match result {
        Err(FetchError::RetryExhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, FetchError::TransientUpstream { status: 500 }));
        }
        other => panic!("expected RetryExhausted, got {:?}", other.map(|r| r.status())),
    }
}

#[tokio::test]
async fn test_rate_limited_response_honours_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let start = Instant::now();
    let body: Value = client(Duration::from_secs(2))
        .fetch_json(&url(&server), &quick_retry_policy())
        .await
        .unwrap();

    assert_eq!(body["ok"], true);
    // The backoff alone would be 20ms
    assert!(start.elapsed() >= Duration::from_secs(1));
}

// =============================================================================
// Timeouts and Decoding
// =============================================================================

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        max_retries: 1,
        ..quick_retry_policy()
    };
    let result = client(Duration::from_millis(100))
        .fetch_with_retry(&url(&server), &policy)
        .await;

    match result {
        Err(FetchError::RetryExhausted { attempts, last }) => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, FetchError::Timeout { .. }));
        }
        other => panic!("expected RetryExhausted, got {:?}", other.map(|r| r.status())),
    }
}

#[tokio::test]
async fn test_invalid_json_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let result: Result<Value, _> = client(Duration::from_secs(2))
        .fetch_json(&url(&server), &quick_retry_policy())
        .await;

    assert!(matches!(result, Err(FetchError::Decode(_))));
}
