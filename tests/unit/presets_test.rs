//! Unit tests for rate limit presets and request-level config resolution

use pretty_assertions::assert_eq;
use ramadan_ingest::models::{FetchRequest, RateLimitPreset};
use rstest::rstest;
use serde_json::json;
use std::time::Duration;

#[rstest]
#[case(RateLimitPreset::Conservative, 5, 1500, 3000, 1, 5.0, 0.5, 1000)]
#[case(RateLimitPreset::Balanced, 10, 800, 2000, 2, 10.0, 1.0, 500)]
#[case(RateLimitPreset::Aggressive, 20, 400, 1000, 3, 20.0, 2.0, 250)]
#[case(RateLimitPreset::Fast, 30, 200, 500, 4, 30.0, 4.0, 150)]
#[case(RateLimitPreset::Turbo, 50, 100, 250, 6, 50.0, 8.0, 100)]
#[allow(clippy::too_many_arguments)]
fn test_preset_table(
    #[case] preset: RateLimitPreset,
    #[case] batch: usize,
    #[case] request_ms: u64,
    #[case] district_ms: u64,
    #[case] concurrent: usize,
    #[case] capacity: f64,
    #[case] refill: f64,
    #[case] min_wait_ms: u64,
) {
    let config = preset.config();

    assert_eq!(config.batch_size, batch);
    assert_eq!(config.inter_request_delay, Duration::from_millis(request_ms));
    assert_eq!(config.inter_district_delay, Duration::from_millis(district_ms));
    assert_eq!(config.max_concurrent_districts, concurrent);
    assert_eq!(config.token_bucket.capacity, capacity);
    assert_eq!(config.token_bucket.refill_rate, refill);
    assert_eq!(config.token_bucket.min_wait_time, Duration::from_millis(min_wait_ms));
    assert!(config.validate().is_ok());
}

#[test]
fn test_catalog_wire_format() {
    let catalog = serde_json::to_value(RateLimitPreset::catalog()).unwrap();

    assert_eq!(catalog.as_object().unwrap().len(), 5);
    assert_eq!(catalog["balanced"]["interRequestDelay"], 800);
    assert_eq!(catalog["turbo"]["tokenBucket"]["minWaitTime"], 100);
    assert_eq!(catalog["conservative"]["maxConcurrentDistricts"], 1);
}

#[rstest]
#[case("fast", RateLimitPreset::Fast)]
#[case("TURBO", RateLimitPreset::Turbo)]
#[case(" balanced ", RateLimitPreset::Balanced)]
fn test_preset_from_str(#[case] input: &str, #[case] expected: RateLimitPreset) {
    assert_eq!(input.parse::<RateLimitPreset>().unwrap(), expected);
}

#[test]
fn test_unknown_preset_is_rejected() {
    assert!("ludicrous".parse::<RateLimitPreset>().is_err());
}

#[test]
fn test_request_without_config_uses_default_preset() {
    let request: FetchRequest = serde_json::from_value(json!({
        "mode": "multiMonth",
        "year": 2026,
        "months": [2, 3],
        "districts": ["Dhaka"]
    }))
    .unwrap();

    assert_eq!(
        request.resolve_rate_limit(RateLimitPreset::Conservative),
        RateLimitPreset::Conservative.config()
    );
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = RateLimitPreset::Fast.config();
    config.token_bucket.refill_rate = 0.0;
    assert!(config.validate().is_err());

    let mut config = RateLimitPreset::Fast.config();
    config.max_concurrent_districts = 0;
    assert!(config.validate().is_err());
}
