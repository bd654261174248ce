//! # Greenhouse Simulation Service
//!
//! The simulation microservice of the greenhouse demo mesh. It owns the per-user
//! real-time simulation scheduler and exposes its control surface:
//!
//! - **`POST /start_simulation`**: starts (or restarts, with a full drain of the
//!   previous task) the background data-generation loop for one user.
//! - **`GET /ws?user_id=...`**: WebSocket endpoint a dashboard connects to. The
//!   session joins the user's room and receives `update_plant` events until it
//!   disconnects; when the last session for a user leaves, that user's
//!   simulation is stopped.
//! - **`GET /trigger_bug`**: arms the single-shot fault flag, suppressing exactly
//!   one subsequent emission (observability demonstration).
//! - **`GET /health`**: liveness probe.
//!
//! Generated readings flow scheduler → `RoomDispatcher` → per-session channel →
//! the socket pump in this file. The plant service is the only upstream call.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        ConnectInfo, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use greenhouse_common::config_sys::SimulationConfig;
use greenhouse_common::core::{
    Delivery, FaultInjector, LeaveOutcome, LogObserver, Observer, PlantServiceClient,
    RoomDispatcher, SessionRegistry, SimContext, SimulationScheduler,
};

/// Command-line overrides; everything else comes from the environment.
#[derive(Debug, Parser)]
#[command(name = "server_sim", about = "Greenhouse simulation service")]
struct Cli {
    /// Port to bind, overriding SERVER_PORT.
    #[arg(long)]
    port: Option<u16>,
}

/// Body of `POST /start_simulation`. The other mesh services send both numeric
/// and string user ids depending on the caller.
#[derive(Debug, Deserialize)]
struct StartSimulationRequest {
    user_id: Option<UserIdField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserIdField {
    Text(String),
    Numeric(i64),
}

impl UserIdField {
    /// Canonical string form of the id; blank strings are as invalid as a
    /// missing field.
    fn normalize(&self) -> Option<String> {
        match self {
            UserIdField::Text(s) if !s.trim().is_empty() => Some(s.clone()),
            UserIdField::Text(_) => None,
            UserIdField::Numeric(n) => Some(n.to_string()),
        }
    }
}

/// Shared state required by the web server's routes.
struct AppState {
    scheduler: Arc<SimulationScheduler>,
    registry: Arc<SessionRegistry>,
    dispatcher: Arc<RoomDispatcher>,
    fault: Arc<FaultInjector>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- Phase 1: Environment & Logging ---
    let _ = dotenvy::dotenv();
    env_logger::init();
    let cli = Cli::parse();

    let mut config = SimulationConfig::from_env()?;
    if let Some(port) = cli.port {
        config.server_port = port;
    }
    log::info!(
        "Greenhouse simulation service booting at {}. {}",
        Utc::now().to_rfc3339(),
        config
    );

    // --- Phase 2: Core Infrastructure ---
    let observer: Arc<dyn Observer> = Arc::new(LogObserver);
    let fault = Arc::new(FaultInjector::new());
    let registry = Arc::new(SessionRegistry::new(observer.clone()));
    let dispatcher = Arc::new(RoomDispatcher::new());

    let ctx = Arc::new(SimContext {
        plants: Arc::new(PlantServiceClient::new(&config.plant_service_url)?),
        delivery: dispatcher.clone() as Arc<dyn Delivery>,
        sessions: registry.clone(),
        fault: fault.clone(),
        observer,
        tick_period: config.tick_period(),
    });
    let scheduler = Arc::new(SimulationScheduler::new(ctx));

    // --- Phase 3: Router and Server Construction ---
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    let state = Arc::new(AppState {
        scheduler,
        registry,
        dispatcher,
        fault,
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/start_simulation", post(start_simulation_handler))
        .route("/trigger_bug", get(trigger_bug_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    log::info!("Simulation service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

/// Liveness probe for orchestrators and uptime checks.
async fn health_handler() -> &'static str {
    "OK"
}

/// # Start Simulation
///
/// Accepts `{"user_id": ...}` (string or integer, matching the other mesh
/// services) and starts or restarts that user's simulation. The caller gets the
/// outcome synchronously: the previous task, if any, is already drained when 200
/// is returned.
async fn start_simulation_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StartSimulationRequest>,
) -> impl IntoResponse {
    let Some(user_id) = body.user_id.as_ref().and_then(UserIdField::normalize) else {
        return (StatusCode::BAD_REQUEST, "Invalid user_id");
    };

    match state.scheduler.start(&user_id).await {
        Ok(()) => (StatusCode::OK, "Simulation started"),
        Err(_) => (StatusCode::BAD_REQUEST, "Invalid user_id"),
    }
}

/// Arms the single-shot fault flag. The next emission anywhere in the process
/// gets suppressed and recorded.
async fn trigger_bug_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    log::error!("Triggering bug...");
    state.fault.trigger();
    (StatusCode::OK, "Bug triggered")
}

/// # WebSocket Upgrade Handler
///
/// Upgrades `/ws?user_id=...` requests. Connections without a user id are
/// accepted and immediately closed; there is no room to join them to.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let user_id = params.get("user_id").cloned().filter(|u| !u.trim().is_empty());
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr, user_id))
}

/// # WebSocket Session
///
/// One connected dashboard session:
/// 1. joins the user's room (`SessionRegistry`) and attaches to the
///    `RoomDispatcher`, receiving the channel the simulation publishes into;
/// 2. pumps dispatcher frames to the socket as `{"event", "data"}` JSON text
///    while watching the socket for the client going away;
/// 3. on exit detaches, leaves the room, and stops the user's simulation if
///    it was the last session for that user.
async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    addr: SocketAddr,
    user_id: Option<String>,
) {
    let Some(user_id) = user_id else {
        log::warn!("WebSocket from {} rejected: no user_id provided", addr);
        return;
    };

    let session_id = format!("ws-{}", addr);
    state.registry.join(&user_id, &session_id);
    let mut rx = state.dispatcher.add_session(&user_id, &session_id);
    log::info!("User {} connected and joined room (session {})", user_id, session_id);

    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                let text = json!({ "event": frame.event, "data": frame.payload }).to_string();
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Inbound messages are ignored; this endpoint only streams out.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Cleanup: detach from delivery first so no further frames queue up, then
    // leave the room and stop the simulation if this was the last session.
    state.dispatcher.remove_session(&user_id, &session_id);
    if state.registry.leave(&user_id, &session_id) == LeaveOutcome::LastSessionLeft {
        state.scheduler.stop_if_present(&user_id).await;
        log::info!("Last session for user {} left; simulation stopped", user_id);
    }
    log::info!("User {} disconnected (session {})", user_id, session_id);
}

/// Listens for CTRL+C and SIGTERM to initiate a graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
