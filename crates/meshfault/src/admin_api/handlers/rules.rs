//! Injection rule CRUD handlers.

use crate::admin_api::types::*;
use crate::injection::{InjectionEngine, InjectionError, InjectionRule};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

fn status_for(err: &InjectionError) -> StatusCode {
    match err {
        InjectionError::InvalidRule(_) => StatusCode::BAD_REQUEST,
        InjectionError::DuplicateRule(_) | InjectionError::CapacityExceeded(_) => {
            StatusCode::CONFLICT
        }
        InjectionError::NotFound(_) => StatusCode::NOT_FOUND,
    }
}

/// GET /injection/rules
pub fn handle_list(engine: &InjectionEngine) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &serde_json::json!({"rules": engine.rules()}))
}

/// POST /injection/rules
pub async fn handle_create<B>(req: Request<B>, engine: Arc<InjectionEngine>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };

    let rule: InjectionRule = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid rule JSON: {e}"))
        }
    };

    match engine.add_rule(rule) {
        Ok(id) => json_response(StatusCode::CREATED, &serde_json::json!({"id": id})),
        Err(e) => {
            warn!("Admin API: rule rejected: {}", e);
            error_response(status_for(&e), &e.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct EnableRequest {
    enabled: bool,
}

/// PATCH /injection/rules/:id
pub async fn handle_set_enabled<B>(
    id: &str,
    req: Request<B>,
    engine: Arc<InjectionEngine>,
) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };

    let request: EnableRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {e}")),
    };

    match engine.set_enabled(id, request.enabled) {
        Ok(()) => json_response(
            StatusCode::OK,
            &serde_json::json!({"id": id, "enabled": request.enabled}),
        ),
        Err(e) => error_response(status_for(&e), &e.to_string()),
    }
}

/// DELETE /injection/rules/:id
pub fn handle_delete(id: &str, engine: &InjectionEngine) -> Response<Full<Bytes>> {
    match engine.remove_rule(id) {
        Ok(_) => json_response(StatusCode::OK, &serde_json::json!({"status": "removed"})),
        Err(e) => error_response(status_for(&e), &e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_for() {
        assert_eq!(
            status_for(&InjectionError::InvalidRule("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&InjectionError::DuplicateRule("x".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&InjectionError::CapacityExceeded(1)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&InjectionError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
    }
}
