//! Admin API server.

use crate::admin_api::router::route_request;
use crate::admin_api::types::AdminState;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Admin API server for meshfault
pub struct AdminApiServer {
    addr: SocketAddr,
    state: AdminState,
}

impl AdminApiServer {
    /// Create a new admin API server
    pub fn new(addr: SocketAddr, state: AdminState) -> Self {
        Self { addr, state }
    }

    /// Run the admin API server
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("meshfault Admin API listening on http://{}", self.addr);
        serve(listener, self.state).await
    }
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, state: AdminState) -> Result<(), anyhow::Error> {
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { route_request(req, state).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Admin API connection error: {}", e);
            }
        });
    }
}
