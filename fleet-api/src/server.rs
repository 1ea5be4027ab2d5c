//! Server bootstrap.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes::create_router;
use crate::state::{ApiConfig, AppState};

/// Build the router with its middleware stack and resolve the bind
/// address.
pub fn create_server(
    config: &ApiConfig,
    state: AppState,
) -> Result<(Router, SocketAddr), Box<dyn std::error::Error + Send + Sync>> {
    let mut router = create_router(state).layer(TraceLayer::new_for_http());

    if config.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    Ok((router, addr))
}

/// Run the API server until the process is stopped.
pub async fn run_server(
    config: ApiConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (router, addr) = create_server(&config, state)?;

    tracing::info!("fleet API listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

/// Bind on an ephemeral port and serve in the background; used by
/// tests and the agent's own test harness.
pub async fn start_background_server(
    config: ApiConfig,
    state: AppState,
) -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
    let (router, addr) = create_server(&config, state)?;

    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            tracing::error!("server error: {}", err);
        }
    });

    Ok(actual_addr)
}
