//! HTTP front door for the Agent Runtime: loads configuration, builds a
//! default `RuntimeResolver`, and serves `POST /agent/run` and
//! `POST /agent/run/{run_id}/stop` over axum.

pub mod app;
pub mod resolver;
pub mod wire;

use std::net::SocketAddr;
use std::sync::Arc;

use agent_core::RunDirectory;
use tracing::info;

pub use app::AppState;
pub use resolver::EnvResolver;

/// Loads config (`agent-config`, app name `"agent-runtime"`), then binds and
/// serves the router on `addr` until the process is terminated.
pub async fn run_serve(addr: SocketAddr) -> std::io::Result<()> {
    if let Err(e) = agent_config::load_and_apply("agent-runtime", None) {
        tracing::warn!(error = %e, "failed to load config; continuing with process environment only");
    }

    let state = AppState { resolver: Arc::new(EnvResolver::from_env()), directory: Arc::new(RunDirectory::new()) };
    let router = app::router(state);

    info!(%addr, "agent runtime listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}
