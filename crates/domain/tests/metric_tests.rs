//! Property tests for route metrics and notices
//!
//! Tests metric timing, minute bucketing and backtrace parsing.

use chrono::{TimeDelta, TimeZone, Timelike, Utc};
use grpcbrake_domain::notice::parse_backtrace;
use grpcbrake_domain::{DomainError, Notice, RouteMetric, METHOD_POST};
use proptest::prelude::*;

// ============================================================================
// RouteMetric Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_duration_matches_finish(start_secs in 0i64..4_000_000_000, elapsed_ms in 0i64..86_400_000) {
        let started_at = Utc.timestamp_opt(start_secs, 0).unwrap();
        let mut metric = RouteMetric::start_at(METHOD_POST, "/pkg.Svc/Call", started_at);

        let elapsed = metric.finish_at(started_at + TimeDelta::milliseconds(elapsed_ms)).unwrap();

        prop_assert_eq!(elapsed, TimeDelta::milliseconds(elapsed_ms));
        prop_assert_eq!(metric.duration(), Some(elapsed));
    }

    #[test]
    fn prop_minute_bucket_truncates_start(start_ms in 0i64..4_000_000_000_000) {
        let started_at = Utc.timestamp_millis_opt(start_ms).unwrap();
        let metric = RouteMetric::start_at(METHOD_POST, "/pkg.Svc/Call", started_at);
        let bucket = metric.minute_bucket();

        prop_assert!(bucket <= started_at);
        prop_assert!(started_at - bucket < TimeDelta::minutes(1));
        prop_assert_eq!(bucket.second(), 0);
        prop_assert_eq!(bucket.nanosecond(), 0);
    }

    #[test]
    fn prop_parse_backtrace_never_panics(rendered in ".*") {
        let _ = parse_backtrace(&rendered);
    }
}

#[test]
fn test_metric_cannot_finish_twice() {
    let mut metric = RouteMetric::start(METHOD_POST, "/pkg.Svc/Call");
    metric.finish().unwrap();

    assert!(matches!(
        metric.finish(),
        Err(DomainError::MetricAlreadyFinished(route)) if route == "/pkg.Svc/Call"
    ));
}

#[test]
fn test_metric_cannot_end_before_start() {
    let started_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let mut metric = RouteMetric::start_at(METHOD_POST, "/pkg.Svc/Call", started_at);

    let result = metric.finish_at(started_at - TimeDelta::seconds(1));
    assert!(matches!(result, Err(DomainError::MetricEndsBeforeStart(_))));
    assert!(metric.ended_at.is_none());
}

// ============================================================================
// Notice Tests
// ============================================================================

#[derive(Debug, thiserror::Error)]
#[error("request failed")]
struct RequestFailed(#[source] std::io::Error);

#[test]
fn test_notice_serializes_error_chain() {
    let err = RequestFailed(std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out"));
    let mut notice = Notice::new(&err);
    notice.set_context("component", "grpc");

    let json = serde_json::to_value(&notice).unwrap();
    let errors = json["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["type"], "RequestFailed");
    assert_eq!(errors[0]["message"], "request failed");
    assert_eq!(errors[1]["message"], "read timed out");
    assert_eq!(json["context"]["component"], "grpc");
    assert!(json.get("skip_frames").is_none());
}
