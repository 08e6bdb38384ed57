//! HTTP control surface for faults and injection rules.
//!
//! Endpoints:
//! - `POST /fault/start/:name`, `POST /fault/stop/:name`
//! - `GET /fault/status/:name`, `GET /fault/list`
//! - `GET|POST /injection/rules`, `DELETE|PATCH /injection/rules/:id`
//! - `GET /health`, `GET /metrics`

mod handlers;
mod router;
mod server;
mod types;

pub use router::route_request;
pub use server::{serve, AdminApiServer};
pub use types::AdminState;
