//! Fault lifecycle handlers.
//!
//! Start and stop run on the blocking pool: stopping joins the fault's
//! worker thread.

use crate::admin_api::types::*;
use crate::fault::{FaultError, FaultManager};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::{error, info};

/// POST /fault/start/:name
pub async fn handle_start(name: &str, faults: Arc<FaultManager>) -> Response<Full<Bytes>> {
    let owned = name.to_string();
    match tokio::task::spawn_blocking(move || faults.start(&owned)).await {
        Ok(Ok(())) => {
            info!("Admin API: fault {} started", name);
            json_response(StatusCode::OK, &serde_json::json!({"status": "started"}))
        }
        Ok(Err(e)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        Err(e) => {
            error!("Start task for fault {} failed: {}", name, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// POST /fault/stop/:name
pub async fn handle_stop(name: &str, faults: Arc<FaultManager>) -> Response<Full<Bytes>> {
    let owned = name.to_string();
    match tokio::task::spawn_blocking(move || faults.stop(&owned)).await {
        Ok(Ok(())) => {
            info!("Admin API: fault {} stopped", name);
            json_response(StatusCode::OK, &serde_json::json!({"status": "stopped"}))
        }
        Ok(Err(e)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        Err(e) => {
            error!("Stop task for fault {} failed: {}", name, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// GET /fault/status/:name
pub fn handle_status(name: &str, faults: &FaultManager) -> Response<Full<Bytes>> {
    match faults.status(name) {
        Ok(status) => json_response(StatusCode::OK, &serde_json::json!({"status": status})),
        Err(e @ FaultError::NotFound(_)) => error_response(StatusCode::NOT_FOUND, &e.to_string()),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// GET /fault/list
pub fn handle_list(faults: &FaultManager) -> Response<Full<Bytes>> {
    let mut names = faults.list();
    names.sort();
    json_response(StatusCode::OK, &serde_json::json!({"faults": names}))
}
