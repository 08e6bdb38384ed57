//! Route dispatch logic for the Admin API.

use crate::admin_api::handlers::{faults, rules, system};
use crate::admin_api::types::{method_not_allowed, not_found, AdminState};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use tracing::debug;

/// Parsed route under `/fault/`
enum FaultRoute<'a> {
    /// POST /fault/start/:name
    Start(&'a str),
    /// POST /fault/stop/:name
    Stop(&'a str),
    /// GET /fault/status/:name
    Status(&'a str),
    /// GET /fault/list
    List,
}

impl<'a> FaultRoute<'a> {
    /// Parse route from path segments after `/fault/`
    fn parse(segments: &[&'a str]) -> Option<Self> {
        match segments {
            ["start", name] if !name.is_empty() => Some(FaultRoute::Start(*name)),
            ["stop", name] if !name.is_empty() => Some(FaultRoute::Stop(*name)),
            ["status", name] if !name.is_empty() => Some(FaultRoute::Status(*name)),
            ["list"] => Some(FaultRoute::List),
            _ => None,
        }
    }

    fn allowed_method(&self) -> Method {
        match self {
            FaultRoute::Start(_) | FaultRoute::Stop(_) => Method::POST,
            FaultRoute::Status(_) | FaultRoute::List => Method::GET,
        }
    }
}

/// Main request router
pub async fn route_request<B>(
    req: Request<B>,
    state: AdminState,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Admin API: {} {}", method, path);

    Ok(route_by_path(&method, &path, req, state).await)
}

async fn route_by_path<B>(
    method: &Method,
    path: &str,
    req: Request<B>,
    state: AdminState,
) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    match (method, path) {
        (&Method::GET, "/health") => return system::handle_health(),
        (&Method::GET, "/metrics") => return system::handle_metrics(),
        (_, "/health") | (_, "/metrics") => return method_not_allowed(),
        _ => {}
    }

    if let Some(rest) = path.strip_prefix("/fault/") {
        let segments: Vec<&str> = rest.split('/').collect();
        let Some(route) = FaultRoute::parse(&segments) else {
            return not_found();
        };
        if *method != route.allowed_method() {
            return method_not_allowed();
        }
        return match route {
            FaultRoute::Start(name) => faults::handle_start(name, state.faults).await,
            FaultRoute::Stop(name) => faults::handle_stop(name, state.faults).await,
            FaultRoute::Status(name) => faults::handle_status(name, &state.faults),
            FaultRoute::List => faults::handle_list(&state.faults),
        };
    }

    if path == "/injection/rules" {
        return match *method {
            Method::GET => rules::handle_list(&state.engine),
            Method::POST => rules::handle_create(req, state.engine).await,
            _ => method_not_allowed(),
        };
    }

    if let Some(id) = path.strip_prefix("/injection/rules/") {
        if id.is_empty() || id.contains('/') {
            return not_found();
        }
        return match *method {
            Method::DELETE => rules::handle_delete(id, &state.engine),
            Method::PATCH => rules::handle_set_enabled(id, req, state.engine).await,
            _ => method_not_allowed(),
        };
    }

    not_found()
}
