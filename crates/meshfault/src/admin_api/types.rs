//! Response helpers and shared state for the Admin API.

use crate::fault::FaultManager;
use crate::injection::InjectionEngine;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

/// Components the admin handlers operate on.
#[derive(Debug, Clone)]
pub struct AdminState {
    pub faults: Arc<FaultManager>,
    pub engine: Arc<InjectionEngine>,
}

impl AdminState {
    pub fn new(faults: Arc<FaultManager>, engine: Arc<InjectionEngine>) -> Self {
        Self { faults, engine }
    }
}

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    build_response_with_headers(status, [("Content-Type", "application/json")], json)
}

/// Build an HTTP response with headers.
///
/// Falls back to a bare response if the builder rejects a header.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let body = body.into();
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder.body(Full::new(body.clone())).unwrap_or_else(|_| {
        let mut response = Response::new(Full::new(body));
        *response.status_mut() = status;
        response
    })
}

/// Error response carrying the error's text: `{"error": "..."}`
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message }))
}

pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

pub fn method_not_allowed() -> Response<Full<Bytes>> {
    error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

/// Collect request body into bytes
pub async fn collect_body<B>(req: Request<B>) -> Result<Bytes, String>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    req.into_body()
        .collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}
