//! Unit tests for upstream payload normalization and entry validation

use pretty_assertions::assert_eq;
use ramadan_ingest::models::ScheduleEntry;
use ramadan_ingest::services::upstream::{normalize, normalize_date, normalize_time, UpstreamEnvelope};
use rstest::rstest;
use serde_json::json;

// =============================================================================
// Time / Date Normalization
// =============================================================================

#[rstest]
#[case("04:45 (+06)", Some("04:45"))]
#[case("18:12 (BST)", Some("18:12"))]
#[case("5:02", Some("05:02"))]
#[case("23:59", Some("23:59"))]
#[case("24:00", None)]
#[case("12:60", None)]
#[case("noon", None)]
fn test_normalize_time(#[case] raw: &str, #[case] expected: Option<&str>) {
    assert_eq!(normalize_time(raw).as_deref(), expected);
}

#[rstest]
#[case("01-03-2026", Some("2026-03-01"))]
#[case(" 29-02-2028 ", Some("2028-02-29"))]
#[case("29-02-2026", None)]
#[case("2026-03-01", None)]
fn test_normalize_date(#[case] raw: &str, #[case] expected: Option<&str>) {
    assert_eq!(normalize_date(raw).as_deref(), expected);
}

// =============================================================================
// Envelope Normalization
// =============================================================================

#[test]
fn test_sehri_from_fajr_and_iftar_from_maghrib() {
    let envelope: UpstreamEnvelope = serde_json::from_value(json!({
        "code": 200,
        "status": "OK",
        "data": [{
            "timings": {
                "Imsak": "04:35 (+06)",
                "Fajr": "04:45 (+06)",
                "Sunset": "18:10 (+06)",
                "Maghrib": "18:12 (+06)"
            },
            "date": {"gregorian": {"date": "01-03-2026"}, "hijri": {"date": "11-09-1447"}}
        }]
    }))
    .unwrap();

    let entries = normalize(&envelope, "Rajshahi").unwrap();

    assert_eq!(
        entries,
        vec![ScheduleEntry::new("2026-03-01", "04:45", "18:12", "Rajshahi")]
    );
}

#[test]
fn test_bad_time_in_payload_is_a_decode_error() {
    let envelope: UpstreamEnvelope = serde_json::from_value(json!({
        "code": 200,
        "data": {
            "timings": {"Fajr": "--", "Maghrib": "18:12"},
            "date": {"gregorian": {"date": "01-03-2026"}}
        }
    }))
    .unwrap();

    let err = normalize(&envelope, "Dhaka").unwrap_err();
    assert!(err.to_string().contains("Fajr"));
}

// =============================================================================
// Entry Validation
// =============================================================================

#[rstest]
#[case(ScheduleEntry::new("2026-03-01", "04:45", "18:12", "Dhaka"), true)]
#[case(ScheduleEntry::new("2026-3-1", "04:45", "18:12", "Dhaka"), false)]
#[case(ScheduleEntry::new("2026-02-30", "04:45", "18:12", "Dhaka"), false)]
#[case(ScheduleEntry::new("2026-03-01", "4:45", "18:12", "Dhaka"), false)]
#[case(ScheduleEntry::new("2026-03-01", "04:45", "18:75", "Dhaka"), false)]
#[case(ScheduleEntry::new("2026-03-01", "04:45", "18:12", "   "), false)]
fn test_entry_validation(#[case] entry: ScheduleEntry, #[case] valid: bool) {
    assert_eq!(entry.validate().is_ok(), valid);
}

#[test]
fn test_entry_key_ignores_surrounding_whitespace() {
    let a = ScheduleEntry::new("2026-03-01", "04:45", "18:12", "Dhaka");
    let b = ScheduleEntry::new("2026-03-01", "04:46", "18:13", " Dhaka ");
    assert_eq!(a.key(), b.key());
}
