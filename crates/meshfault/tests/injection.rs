//! Integration tests for the injection middleware wrapped around the demo
//! upstream.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, StatusCode};
use meshfault::demo::{self, LATENCY_METRIC};
use meshfault::injection::{REQUEST_ID_HEADER, RULE_ID_HEADER};
use meshfault::{
    InjectionEngine, InjectionRule, InjectionType, MetricInjector, ProbabilityGate,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::{ServiceBuilder, ServiceExt};

fn engine() -> Arc<InjectionEngine> {
    Arc::new(InjectionEngine::with_gate(
        100,
        Arc::new(ProbabilityGate::with_seed(99)),
    ))
}

async fn send(injector: &MetricInjector, path: &str) -> (Response<Full<Bytes>>, Value) {
    let upstream = {
        let injector = injector.clone();
        tower::service_fn(move |req: Request<Full<Bytes>>| demo::handle(req, injector.clone()))
    };
    let service = ServiceBuilder::new()
        .layer(injector.http_middleware())
        .service(upstream);

    let req = Request::builder()
        .uri(path)
        .header(REQUEST_ID_HEADER, "req-42")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let resp = service.oneshot(req).await.unwrap();
    let (parts, body) = resp.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (Response::from_parts(parts, Full::new(bytes)), value)
}

#[tokio::test]
async fn test_passthrough_without_rules() {
    let injector = MetricInjector::new(engine(), "orders");
    let (resp, body) = send(&injector, "/orders").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body["service"], "orders");
    assert_eq!(body["path"], "/orders");
    assert!(resp.headers().get(RULE_ID_HEADER).is_none());
}

#[tokio::test]
async fn test_storage_error_rule_short_circuits() {
    let engine = engine();
    engine
        .add_rule(
            InjectionRule::new(InjectionType::StorageError, "orders", "/orders", 1.0)
                .with_id("store-down")
                .with_error("BUCKET_NOT_FOUND", "S3_404", "bucket missing"),
        )
        .unwrap();
    let injector = MetricInjector::new(engine, "orders");

    let (resp, body) = send(&injector, "/orders").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers().get(RULE_ID_HEADER).unwrap(), "store-down");
    assert_eq!(body["type"], "BUCKET_NOT_FOUND");
    assert_eq!(body["code"], "S3_404");
    assert_eq!(body["message"], "bucket missing");
    assert_eq!(body["request_id"], "req-42");

    let (resp, _) = send(&injector, "/other").await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_latency_rule_delays_then_forwards() {
    let engine = engine();
    engine
        .add_rule(
            InjectionRule::new(InjectionType::HttpLatency, "orders", "/orders", 1.0)
                .with_config("delay_ms", 60),
        )
        .unwrap();
    let injector = MetricInjector::new(engine, "orders");

    let started = Instant::now();
    let (resp, body) = send(&injector, "/orders").await;
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body["service"], "orders");
    assert!(body[LATENCY_METRIC].as_f64().unwrap() >= 60.0);
}

#[tokio::test]
async fn test_disabled_and_zero_rate_rules_never_fire() {
    let engine = engine();
    engine
        .add_rule(InjectionRule::new(InjectionType::HttpError, "orders", "/a", 1.0).disabled())
        .unwrap();
    engine
        .add_rule(InjectionRule::new(InjectionType::HttpError, "orders", "/b", 0.0))
        .unwrap();
    let injector = MetricInjector::new(engine, "orders");

    for _ in 0..50 {
        assert_eq!(send(&injector, "/a").await.0.status(), StatusCode::OK);
        assert_eq!(send(&injector, "/b").await.0.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_partial_rate_fires_sometimes() {
    let engine = engine();
    engine
        .add_rule(InjectionRule::new(InjectionType::DbError, "orders", "/orders", 0.5))
        .unwrap();
    let injector = MetricInjector::new(engine, "orders");

    let mut failed = 0;
    for _ in 0..400 {
        if send(&injector, "/orders").await.0.status() != StatusCode::OK {
            failed += 1;
        }
    }
    assert!((120..=280).contains(&failed), "failed={failed}");
}

#[tokio::test]
async fn test_metric_anomaly_applies_to_reported_latency() {
    let engine = engine();
    engine
        .add_rule(
            InjectionRule::new(InjectionType::MetricAnomaly, "orders", LATENCY_METRIC, 1.0)
                .with_config("mode", "offset")
                .with_config("offset", 1000.0),
        )
        .unwrap();
    let injector = MetricInjector::new(engine, "orders");

    let (resp, body) = send(&injector, "/orders").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body[LATENCY_METRIC].as_f64().unwrap() >= 1000.0);
}
