//! Demo upstream served behind the injection middleware.
//!
//! Every path answers with a small JSON document. The handler reports the
//! time since the injection layer accepted the request through
//! [`MetricInjector::inject_metric_anomaly`], so both injected latency and
//! `metric_anomaly` rules on `request_latency_ms` show up in the body.

use crate::injection::{MetricInjector, RequestStart};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::{debug, info};

pub const LATENCY_METRIC: &str = "request_latency_ms";

/// Upstream handler. Generic over the request body so tests can drive it
/// without a socket.
pub async fn handle<B>(
    req: Request<B>,
    injector: MetricInjector,
) -> Result<Response<Full<Bytes>>, Infallible> {
    // Measured from when the injection layer first saw the request, so an
    // injected delay shows up in the reported latency.
    let started = req
        .extensions()
        .get::<RequestStart>()
        .map(|start| start.0)
        .unwrap_or_else(Instant::now);
    let path = req.uri().path().to_string();

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    let reported = injector.inject_metric_anomaly(LATENCY_METRIC, elapsed_ms);

    let body = serde_json::json!({
        "service": injector.service(),
        "path": path,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        LATENCY_METRIC: reported,
    });

    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

/// Serve the demo upstream on `addr` until the task is dropped.
pub async fn run(addr: SocketAddr, injector: MetricInjector) -> Result<(), anyhow::Error> {
    let listener = TcpListener::bind(addr).await?;
    info!(
        "Demo upstream for service {} listening on http://{}",
        injector.service(),
        addr
    );

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let injector = injector.clone();

        tokio::spawn(async move {
            let upstream = {
                let injector = injector.clone();
                tower::service_fn(move |req: Request<Incoming>| handle(req, injector.clone()))
            };
            let service = ServiceBuilder::new()
                .layer(injector.http_middleware())
                .service(upstream);

            if let Err(e) = http1::Builder::new()
                .serve_connection(io, TowerToHyperService::new(service))
                .await
            {
                debug!("Demo connection error: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injection::{InjectionEngine, InjectionRule, InjectionType};
    use http_body_util::BodyExt;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_handle_reports_unmodified_latency() {
        let engine = Arc::new(InjectionEngine::new(10));
        let injector = MetricInjector::new(engine, "demo");

        let req = Request::new(Full::new(Bytes::new()));
        let resp = handle(req, injector).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["service"], "demo");
        assert!(value[LATENCY_METRIC].as_f64().unwrap() < 1000.0);
    }

    #[tokio::test]
    async fn test_handle_measures_from_request_start() {
        let engine = Arc::new(InjectionEngine::new(10));
        let injector = MetricInjector::new(engine, "demo");

        let mut req = Request::new(Full::new(Bytes::new()));
        req.extensions_mut().insert(RequestStart(
            Instant::now() - std::time::Duration::from_millis(50),
        ));
        let resp = handle(req, injector).await.unwrap();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value[LATENCY_METRIC].as_f64().unwrap() >= 50.0);
    }

    #[tokio::test]
    async fn test_handle_applies_metric_anomaly() {
        let engine = Arc::new(InjectionEngine::new(10));
        engine
            .add_rule(
                InjectionRule::new(InjectionType::MetricAnomaly, "demo", LATENCY_METRIC, 1.0)
                    .with_config("mode", "replace")
                    .with_config("value", 5000.0),
            )
            .unwrap();
        let injector = MetricInjector::new(engine, "demo");

        let resp = handle(Request::new(Full::new(Bytes::new())), injector)
            .await
            .unwrap();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value[LATENCY_METRIC].as_f64().unwrap(), 5000.0);
    }
}
