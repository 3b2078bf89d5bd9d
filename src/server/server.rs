use anyhow::{Context, Result};
use std::time::Duration;

use tracing::info;

use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use super::metrics::metrics_handler;
use super::rooms::make_room_routes;
use super::{log_requests, state::*, ServerConfig};
use crate::relay::CloseReason;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub version: String,
    pub rooms: usize,
    pub participants: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let registry = state.relay.registry();
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        version: state.version.clone(),
        rooms: registry.room_count(),
        participants: registry.participant_count(),
    };
    Json(stats)
}

pub fn make_app(config: ServerConfig, relay: GuardedRelay) -> Router {
    let state = ServerState::new(config, relay);

    let home_router: Router = Router::new()
        .route("/", get(home))
        .with_state(state.clone());

    home_router
        .merge(make_room_routes(state.clone()))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn_with_state(state, log_requests))
                .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any)),
        )
}

pub fn make_metrics_app(relay: GuardedRelay) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(relay)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub async fn run_server(config: ServerConfig, relay: GuardedRelay) -> Result<()> {
    let address = format!("{}:{}", config.bind_address, config.port);

    if config.metrics_port != 0 {
        let metrics_address = format!("{}:{}", config.bind_address, config.metrics_port);
        let metrics_listener = tokio::net::TcpListener::bind(&metrics_address)
            .await
            .with_context(|| format!("Failed to bind metrics listener on {}", metrics_address))?;
        let metrics_app = make_metrics_app(relay.clone());
        info!("Metrics available at {}/metrics", metrics_address);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(metrics_listener, metrics_app).await {
                tracing::error!("Metrics server failed: {}", e);
            }
        });
    }

    let app = make_app(config, relay.clone());
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Ready to serve at {}!", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Open WebSocket connections keep serving after the listener stops;
    // tell their peers we are going away.
    relay.close_all(CloseReason::going_away());
    Ok(())
}
