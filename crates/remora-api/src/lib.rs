pub mod handlers;

use std::future::Future;
use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

/// Largest accepted command or upload body.
pub const MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", post(handlers::commands::handle_submit))
        .route("/{kind}", post(handlers::commands::handle_submit_kind))
        .route("/object/{id}", get(handlers::results::handle_object))
        .route("/state/{id}", get(handlers::results::handle_state))
        .route("/status/{id}", get(handlers::results::handle_status))
        .route("/contract", get(handlers::contract::handle_contract))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Serve on `bind` until `shutdown` resolves.
pub async fn serve(
    state: ApiState,
    bind: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Bind `host:port` and serve in the background.
///
/// Returns the bound address (useful when port=0).
pub async fn start(state: ApiState, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    tracing::info!(addr = %actual_addr, "API listening");

    let app = router(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "API server failed");
        }
    });
    Ok(actual_addr)
}
