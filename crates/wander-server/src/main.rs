mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use wander_api::{AppState, AppStateInner};
use wander_gateway::session::verify_token;
use wander_gateway::{ChatHub, HubOptions, connection};

use crate::config::ServerConfig;

#[derive(Clone)]
struct ServerState {
    hub: ChatHub,
    jwt_secret: String,
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wander=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = Arc::new(wander_db::Database::open(&config.db_path)?);

    // Shared state
    let hub = ChatHub::new(
        db,
        HubOptions {
            notify_on_message: config.notify_on_message,
        },
    );
    let app_state: AppState = Arc::new(AppStateInner {
        hub: hub.clone(),
        jwt_secret: config.jwt_secret.clone(),
    });

    let state = ServerState {
        hub,
        jwt_secret: config.jwt_secret.clone(),
    };

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(wander_api::router(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_addr()?;
    info!("Wander server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// `/gateway?token=...` authenticates before the upgrade; without a token the
/// client must send `identify` as its first frame.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match query.token {
        Some(token) => match verify_token(&state.jwt_secret, &token) {
            Ok(claims) => ws
                .on_upgrade(move |socket| {
                    connection::handle_connection_authenticated(socket, state.hub, claims)
                })
                .into_response(),
            Err(e) => {
                warn!("Gateway upgrade rejected: {}", e);
                StatusCode::UNAUTHORIZED.into_response()
            }
        },
        None => ws
            .on_upgrade(move |socket| {
                connection::handle_connection(socket, state.hub, state.jwt_secret)
            })
            .into_response(),
    }
}
