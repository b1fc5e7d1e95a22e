//! Tests for the unary call interceptor.

use futures::FutureExt;
use grpcbrake_api_grpc::interceptors::request_call_context;
use grpcbrake_api_grpc::{grpc_raw_code_to_http, UnaryServerInfo, UnaryServerInterceptor};
use grpcbrake_domain::{CallContext, COMPONENT_GRPC, METHOD_POST};
use proptest::prelude::*;
use grpcbrake_testing::{
    create_test_call_context, random_full_method, PlainError, RecordingMetricSink,
    RecordingReporter, TEST_METHOD,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tonic::{Code, Request, Status};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn interceptor() -> (UnaryServerInterceptor, RecordingReporter, RecordingMetricSink) {
    let reporter = RecordingReporter::new();
    let sink = RecordingMetricSink::new();
    let interceptor =
        UnaryServerInterceptor::with_collaborators(Arc::new(reporter.clone()), Arc::new(sink.clone()));
    (interceptor, reporter, sink)
}

#[tokio::test]
async fn test_success_reports_ok_without_notice() {
    let (interceptor, reporter, sink) = interceptor();
    let info = UnaryServerInfo::new(TEST_METHOD);

    let result = interceptor
        .intercept(&create_test_call_context(), "world".to_string(), &info, |_, name| async move {
            Ok::<_, Status>(format!("Hello, {}", name))
        })
        .await;

    assert_eq!(result.unwrap(), "Hello, world");
    assert_eq!(reporter.built_count(), 0);
    assert_eq!(reporter.notice_count(), 0);
    assert_eq!(sink.begun_count(), 1);
    assert_eq!(sink.status_codes(), vec![200]);

    let submitted = &sink.submitted()[0];
    assert_eq!(submitted.metric.method, METHOD_POST);
    assert_eq!(submitted.metric.route, TEST_METHOD);
}

#[tokio::test]
async fn test_invalid_argument_is_reported_and_returned_unchanged() {
    let (interceptor, reporter, sink) = interceptor();
    let info = UnaryServerInfo::new(TEST_METHOD);

    let result = interceptor
        .intercept(&CallContext::new(), (), &info, |_, _| async {
            Err::<(), _>(Status::invalid_argument("name must not be empty"))
        })
        .await;

    let status = result.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(status.message(), "name must not be empty");

    assert_eq!(sink.status_codes(), vec![400]);

    let notices = reporter.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].component(), Some(COMPONENT_GRPC));
    assert_eq!(notices[0].action(), Some(TEST_METHOD));
    assert!(notices[0].message().contains("name must not be empty"));
    assert_eq!(notices[0].skip_frames, 3);
}

#[tokio::test]
async fn test_error_without_status_is_internal() {
    let (interceptor, reporter, sink) = interceptor();
    let info = UnaryServerInfo::new(TEST_METHOD);

    let result = interceptor
        .intercept(&CallContext::new(), (), &info, |_, _| async {
            Err::<(), BoxError>(Box::new(PlainError::new("database unreachable")))
        })
        .await;

    assert_eq!(result.unwrap_err().to_string(), "database unreachable");
    assert_eq!(sink.status_codes(), vec![500]);
    assert_eq!(reporter.notice_count(), 1);
    assert_eq!(reporter.notices()[0].message(), "database unreachable");
}

#[tokio::test]
async fn test_anyhow_error_wrapping_status_is_classified() {
    let (interceptor, reporter, sink) = interceptor();
    let info = UnaryServerInfo::new(TEST_METHOD);

    let result = interceptor
        .intercept(&CallContext::new(), (), &info, |_, _| async {
            Err::<(), anyhow::Error>(
                anyhow::Error::new(Status::not_found("user 42")).context("loading profile"),
            )
        })
        .await;

    assert!(result.is_err());
    assert_eq!(sink.status_codes(), vec![404]);
    assert_eq!(reporter.notice_count(), 1);
}

#[tokio::test]
async fn test_metric_sink_failure_does_not_change_result() {
    let reporter = RecordingReporter::new();
    let sink = RecordingMetricSink::failing();
    let interceptor =
        UnaryServerInterceptor::with_collaborators(Arc::new(reporter.clone()), Arc::new(sink.clone()));
    let info = UnaryServerInfo::new(TEST_METHOD);

    let ok = interceptor
        .intercept(&CallContext::new(), 7u32, &info, |_, n| async move {
            Ok::<_, Status>(n * 6)
        })
        .await;
    assert_eq!(ok.unwrap(), 42);

    let err = interceptor
        .intercept(&CallContext::new(), (), &info, |_, _| async {
            Err::<(), _>(Status::permission_denied("no"))
        })
        .await;
    assert_eq!(err.unwrap_err().code(), Code::PermissionDenied);

    assert_eq!(sink.status_codes(), vec![200, 403]);
    assert_eq!(reporter.notice_count(), 1);
}

#[tokio::test]
async fn test_handler_receives_tracking_context() {
    let (interceptor, _reporter, sink) = interceptor();
    let info = UnaryServerInfo::new(TEST_METHOD);
    let inbound = create_test_call_context();

    let seen = interceptor
        .intercept(&inbound, (), &info, |ctx, _| async move { Ok::<_, Status>(ctx) })
        .await
        .unwrap();

    assert!(inbound.tracking().is_none());
    assert_eq!(seen.request_id(), inbound.request_id());

    let tracking = seen.tracking().expect("tracking context");
    let submitted = &sink.submitted()[0];
    assert_eq!(tracking.metric_id(), submitted.metric.id);
    assert_eq!(tracking.route(), TEST_METHOD);
    assert_eq!(submitted.context, seen);
}

#[tokio::test]
async fn test_intercept_request_stores_context_in_extensions() {
    let (interceptor, _reporter, sink) = interceptor();
    let info = UnaryServerInfo::new(TEST_METHOD);
    let mut request = Request::new("ping".to_string());
    request
        .metadata_mut()
        .insert("x-request-id", "req-123".parse().unwrap());

    let (ctx, message) = interceptor
        .intercept_request(request, &info, |request| async move {
            let ctx = request_call_context(&request).cloned();
            Ok::<_, Status>((ctx, request.into_inner()))
        })
        .await
        .unwrap();

    let ctx = ctx.expect("context in extensions");
    assert_eq!(message, "ping");
    assert_eq!(ctx.request_id(), Some("req-123"));
    assert_eq!(
        ctx.tracking().map(|t| t.metric_id()),
        Some(sink.submitted()[0].metric.id)
    );
}

#[tokio::test]
async fn test_chained_interceptors_each_report() {
    let (outer, reporter, sink) = interceptor();
    let inner = outer.clone();
    let outer_info = UnaryServerInfo::new("/pkg.Gateway/Forward");
    let inner_info = UnaryServerInfo::new(TEST_METHOD);

    let mut request = Request::new(());
    request
        .metadata_mut()
        .insert("x-request-id", "chained".parse().unwrap());

    let (inner, inner_info) = (&inner, &inner_info);
    let result = outer
        .intercept_request(request, &outer_info, move |request| async move {
            inner
                .intercept_request(request, inner_info, |_| async {
                    Err::<(), _>(Status::unavailable("backend down"))
                })
                .await
        })
        .await;

    assert_eq!(result.unwrap_err().code(), Code::Unavailable);
    assert_eq!(sink.status_codes(), vec![503, 503]);

    let submitted = sink.submitted();
    assert_eq!(submitted[0].metric.route, TEST_METHOD);
    assert_eq!(submitted[1].metric.route, "/pkg.Gateway/Forward");
    assert_eq!(submitted[0].context.request_id(), Some("chained"));

    let actions: Vec<_> = reporter
        .notices()
        .iter()
        .map(|n| n.action().map(str::to_string))
        .collect();
    assert_eq!(
        actions,
        vec![
            Some(TEST_METHOD.to_string()),
            Some("/pkg.Gateway/Forward".to_string())
        ]
    );
}

#[tokio::test]
async fn test_dropped_call_is_reported_as_cancelled() {
    let (interceptor, reporter, sink) = interceptor();
    let info = UnaryServerInfo::new(TEST_METHOD);

    let ctx = CallContext::new();
    let call = interceptor.intercept(&ctx, (), &info, |_, _| {
        std::future::pending::<Result<(), Status>>()
    });
    assert!(call.now_or_never().is_none());

    assert_eq!(sink.submitted_count(), 1);
    assert_eq!(sink.status_codes(), vec![499]);
    assert_eq!(reporter.notice_count(), 1);
    assert_eq!(reporter.notices()[0].action(), Some(TEST_METHOD));
}

async fn exploding_handler(_ctx: CallContext, _request: ()) -> Result<(), Status> {
    panic!("handler exploded")
}

#[tokio::test]
async fn test_panicking_handler_is_internal_and_resumed() {
    let (interceptor, reporter, sink) = interceptor();
    let info = UnaryServerInfo::new(TEST_METHOD);

    let outcome = AssertUnwindSafe(interceptor.intercept(
        &CallContext::new(),
        (),
        &info,
        exploding_handler,
    ))
    .catch_unwind()
    .await;

    let panic = outcome.unwrap_err();
    assert_eq!(panic.downcast_ref::<&str>(), Some(&"handler exploded"));

    assert_eq!(sink.submitted_count(), 1);
    assert_eq!(sink.status_codes(), vec![500]);

    let notices = reporter.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].action(), Some(TEST_METHOD));
    assert!(notices[0].message().contains("handler panicked"));
}

#[tokio::test]
async fn test_random_methods_are_used_as_routes() {
    let (interceptor, reporter, sink) = interceptor();

    for _ in 0..5 {
        let method = random_full_method();
        let info = UnaryServerInfo::new(method.clone());
        interceptor
            .intercept(&CallContext::new(), (), &info, |_, _| async {
                Err::<(), _>(Status::aborted("conflict"))
            })
            .await
            .unwrap_err();

        assert_eq!(sink.submitted().last().unwrap().metric.route, method);
        assert_eq!(reporter.notices().last().unwrap().action(), Some(method.as_str()));
    }

    assert_eq!(sink.status_codes(), vec![409; 5]);
}

proptest! {
    #[test]
    fn prop_failing_calls_use_classified_status(raw in 1i32..=16) {
        let (interceptor, reporter, sink) = interceptor();
        let info = UnaryServerInfo::new(TEST_METHOD);

        let result = futures::executor::block_on(interceptor.intercept(
            &CallContext::new(),
            (),
            &info,
            |_, _| async move { Err::<(), _>(Status::new(Code::from(raw), "failure")) },
        ));

        prop_assert_eq!(result.unwrap_err().code(), Code::from(raw));
        prop_assert_eq!(sink.status_codes(), vec![grpc_raw_code_to_http(raw)]);
        prop_assert_eq!(reporter.notice_count(), 1);
    }
}
