//! HTTP injection middleware.
//!
//! [`MetricInjector::http_middleware`] returns a tower [`Layer`] that runs
//! every request through the [`InjectionEngine`] before it reaches the
//! wrapped service:
//!
//! - error rules (`http_error`, `db_error`, `storage_error`) answer with the
//!   rule's [`AppError`] and never call the inner service
//! - latency rules (`http_latency`, `db_slow`) sleep on the request's own
//!   task, then call the inner service, or answer with the error when
//!   `config.abort` is `true`
//! - no match, or the gate does not fire: the request passes through

use super::anomaly::MetricAnomalyService;
use super::engine::InjectionEngine;
use super::rule::InjectionType;
use crate::error::AppError;
use crate::metrics;
use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::{Layer, Service};
use tracing::{debug, info};

/// Request header whose value is copied into injected errors.
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Response header naming the rule that produced an injected response.
pub const RULE_ID_HEADER: &str = "x-meshfault-rule-id";

/// Request extension holding the instant the middleware first saw the
/// request, so handlers can report latency that includes injected delay.
#[derive(Debug, Clone, Copy)]
pub struct RequestStart(pub Instant);

/// Outcome of evaluating one request.
#[derive(Debug)]
enum Decision {
    Pass,
    Fail {
        rule_id: String,
        error: AppError,
    },
    Delay {
        rule_id: String,
        delay: Duration,
        abort: Option<AppError>,
    },
}

/// Entry point for request and metric injection on behalf of one service.
#[derive(Clone)]
pub struct MetricInjector {
    engine: Arc<InjectionEngine>,
    anomalies: MetricAnomalyService,
    service: String,
}

impl MetricInjector {
    pub fn new(engine: Arc<InjectionEngine>, service: impl Into<String>) -> Self {
        let service = service.into();
        Self {
            anomalies: MetricAnomalyService::new(Arc::clone(&engine), service.clone()),
            engine,
            service,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn engine(&self) -> &Arc<InjectionEngine> {
        &self.engine
    }

    /// Tower layer applying injection to every request of the wrapped
    /// service.
    pub fn http_middleware(&self) -> InjectionLayer {
        InjectionLayer {
            injector: self.clone(),
        }
    }

    /// See [`MetricAnomalyService::inject_metric_anomaly`].
    pub fn inject_metric_anomaly(&self, metric_name: &str, original_value: f64) -> f64 {
        self.anomalies
            .inject_metric_anomaly(metric_name, original_value)
    }

    fn decide(&self, endpoint: &str, request_id: Option<&str>) -> Decision {
        let Some(rule) = self.engine.find_rule(&self.service, endpoint, |r| {
            r.injection_type != InjectionType::MetricAnomaly
        }) else {
            return Decision::Pass;
        };

        if !self.engine.gate(rule.rate) {
            debug!("Rule {} matched {} but did not fire", rule.id, endpoint);
            return Decision::Pass;
        }

        let mut error = self.engine.create_error(&rule);
        if let Some(id) = request_id {
            error = error.with_request_id(id);
        }
        metrics::record_injection(rule.injection_type.as_str(), &rule.id);

        if rule.injection_type.is_latency() {
            let delay = self.engine.latency_for(&rule);
            let abort = rule.config_bool("abort").unwrap_or(false);
            info!(
                "Injecting {:?} latency on {}{} (rule {}, abort={})",
                delay, self.service, endpoint, rule.id, abort
            );
            metrics::record_latency(&rule.id, delay.as_millis() as u64);
            Decision::Delay {
                rule_id: rule.id,
                delay,
                abort: abort.then_some(error),
            }
        } else {
            info!(
                "Injecting {} on {}{} (rule {})",
                error.kind, self.service, endpoint, rule.id
            );
            Decision::Fail {
                rule_id: rule.id,
                error,
            }
        }
    }
}

impl std::fmt::Debug for MetricInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricInjector")
            .field("service", &self.service)
            .finish()
    }
}

/// Build the response for an injected error.
fn injected_response<B: From<Bytes>>(error: &AppError, rule_id: &str) -> Response<B> {
    let mut response = Response::new(B::from(Bytes::from(error.to_json())));
    *response.status_mut() = error.status_code();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(value) = HeaderValue::from_str(rule_id) {
        headers.insert(HeaderName::from_static(RULE_ID_HEADER), value);
    }
    response
}

/// Layer produced by [`MetricInjector::http_middleware`].
#[derive(Debug, Clone)]
pub struct InjectionLayer {
    injector: MetricInjector,
}

impl<S> Layer<S> for InjectionLayer {
    type Service = InjectionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InjectionService {
            inner,
            injector: self.injector.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InjectionService<S> {
    inner: S,
    injector: MetricInjector,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for InjectionService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: From<Bytes> + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        if request.extensions().get::<RequestStart>().is_none() {
            request.extensions_mut().insert(RequestStart(Instant::now()));
        }
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok());
        let decision = self.injector.decide(request.uri().path(), request_id);

        // Keep the service that was driven to readiness for this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match decision {
                Decision::Pass => inner.call(request).await,
                Decision::Fail { rule_id, error } => Ok(injected_response(&error, &rule_id)),
                Decision::Delay {
                    rule_id,
                    delay,
                    abort,
                } => {
                    tokio::time::sleep(delay).await;
                    match abort {
                        Some(error) => Ok(injected_response(&error, &rule_id)),
                        None => inner.call(request).await,
                    }
                }
            }
        })
    }
}
