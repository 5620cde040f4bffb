//! HTTP facade.
//!
//! A thin REST/SSE surface over the orchestrator, signal tables, and session
//! store. Handlers translate requests into core calls and map the error
//! taxonomy onto status codes; terminal investigation events close the SSE
//! response rather than erroring it.

mod routes;

pub use routes::{build_router, AppState};

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Serve the API until `shutdown` resolves.
pub async fn serve<F>(
    state: Arc<AppState>,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let router = build_router(state);
    tracing::info!(%addr, "HTTP facade listening");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;
    Ok(())
}
