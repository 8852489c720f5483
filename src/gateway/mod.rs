//! Axum HTTP/WebSocket gateway (spec.md §4.8, §5): ingestion POST endpoints,
//! per-topic hub subscriptions, and the process health endpoint.
//!
//! Subscriber lifecycle lives here, not in `hubs::Hub`: the hub only knows
//! how to fan out and drop a subscriber whose outbound queue is full. This
//! layer owns the WebSocket-protocol concerns — authentication before
//! upgrade, binding a filter to the caller's identity, and the ping/read-
//! deadline handshake that notices a silently dead client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::config::Config;
use crate::hubs::{HubManager, SubscriberFilter};
use crate::ingestion::IngestionHandler;
use crate::model::{LogPayload, MetricPayload, ProcessPayload};
use crate::stores::traits::SessionAuth;

pub const MAX_BODY_SIZE: usize = 1_048_576;
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionHandler>,
    pub hubs: Arc<HubManager>,
    pub session_auth: Arc<dyn SessionAuth>,
    pub ping_interval: Duration,
    pub read_deadline: Duration,
}

impl AppState {
    pub fn new(
        ingestion: Arc<IngestionHandler>,
        hubs: Arc<HubManager>,
        session_auth: Arc<dyn SessionAuth>,
        config: &Config,
    ) -> Self {
        Self {
            ingestion,
            hubs,
            session_auth,
            ping_interval: Duration::from_secs(config.hubs.ping_interval_secs),
            read_deadline: Duration::from_secs(config.hubs.read_deadline_secs),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handle_health))
        .route("/v1/metrics", post(handle_ingest_metrics))
        .route("/v1/logs", post(handle_ingest_logs))
        .route("/v1/process", post(handle_ingest_process))
        .route("/v1/subscribe/metrics", get(handle_ws_metrics))
        .route("/v1/subscribe/logs", get(handle_ws_logs))
        .route("/v1/subscribe/events", get(handle_ws_events))
        .route("/v1/subscribe/alerts", get(handle_ws_alerts))
        .route("/v1/subscribe/process", get(handle_ws_process))
        .route("/v1/subscribe/command", get(handle_ws_command))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Binds the gateway's `TcpListener` and serves until `shutdown` fires.
pub async fn run_gateway(
    host: &str,
    port: u16,
    state: AppState,
    shutdown: tokio_util::sync::CancellationToken,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "gateway listening");
    crate::health::mark_component_ok("gateway");

    let app = router(state);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn handle_health() -> impl IntoResponse {
    Json(crate::health::snapshot_json())
}

async fn handle_ingest_metrics(
    State(state): State<AppState>,
    Json(payload): Json<MetricPayload>,
) -> impl IntoResponse {
    state.ingestion.ingest_metrics(payload).await;
    StatusCode::ACCEPTED
}

async fn handle_ingest_logs(
    State(state): State<AppState>,
    Json(payload): Json<LogPayload>,
) -> impl IntoResponse {
    state.ingestion.ingest_logs(payload).await;
    StatusCode::ACCEPTED
}

async fn handle_ingest_process(
    State(state): State<AppState>,
    Json(payload): Json<ProcessPayload>,
) -> impl IntoResponse {
    state.ingestion.ingest_process(payload).await;
    StatusCode::ACCEPTED
}

/// Query parameters accepted on every `/v1/subscribe/*` upgrade.
#[derive(Debug, serde::Deserialize)]
struct SubscribeQuery {
    #[serde(default)]
    token: String,
    #[serde(default)]
    endpoint_id: String,
}

/// Authenticates via the session-claims contract and, if the caller named an
/// `EndpointID`, resolves its `Meta` to bind `AgentID`/`HostID` onto the
/// subscriber filter. Returns `None` if authentication fails.
fn authorize_and_bind(state: &AppState, query: &SubscribeQuery) -> Option<SubscriberFilter> {
    state.session_auth.get_session_claims(&query.token)?;

    let mut filter = SubscriberFilter {
        endpoint_id: query.endpoint_id.clone(),
        agent_id: String::new(),
        host_id: String::new(),
    };

    if !filter.endpoint_id.is_empty() {
        if let Some(meta) = state.ingestion.resolve_meta(&filter.endpoint_id) {
            filter.agent_id = meta.agent_id;
            filter.host_id = meta.host_id;
        }
    }

    Some(filter)
}

macro_rules! ws_subscribe_handler {
    ($fn_name:ident, $hub_accessor:ident) => {
        async fn $fn_name(
            ws: WebSocketUpgrade,
            State(state): State<AppState>,
            Query(query): Query<SubscribeQuery>,
        ) -> axum::response::Response {
            let Some(filter) = authorize_and_bind(&state, &query) else {
                return StatusCode::UNAUTHORIZED.into_response();
            };

            ws.on_upgrade(move |socket| async move {
                let hubs = state.hubs.clone();
                let (id, rx) = hubs.$hub_accessor().join(filter);
                let ping_interval = state.ping_interval;
                let read_deadline = state.read_deadline;
                serve_subscription(socket, rx, ping_interval, read_deadline).await;
                hubs.$hub_accessor().remove(id);
            })
            .into_response()
        }
    };
}

ws_subscribe_handler!(handle_ws_metrics, metrics);
ws_subscribe_handler!(handle_ws_logs, logs);
ws_subscribe_handler!(handle_ws_events, events);
ws_subscribe_handler!(handle_ws_alerts, alerts);
ws_subscribe_handler!(handle_ws_process, process);
ws_subscribe_handler!(handle_ws_command, command);

/// Drives a single subscriber socket: forwards hub payloads as JSON text
/// frames, pings every `ping_interval`, and closes the connection if no
/// pong has been seen within `read_deadline` (spec.md §4.8).
async fn serve_subscription<T>(
    mut socket: WebSocket,
    mut rx: mpsc::Receiver<T>,
    ping_interval: Duration,
    read_deadline: Duration,
) where
    T: serde::Serialize + Send + 'static,
{
    let mut pinger = tokio::time::interval(ping_interval);
    pinger.tick().await;

    let deadline = tokio::time::sleep(read_deadline);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            () = &mut deadline => {
                tracing::debug!("subscriber read deadline elapsed, closing socket");
                break;
            }
            _ = pinger.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            payload = rx.recv() => {
                match payload {
                    Some(item) => {
                        let text = match serde_json::to_string(&item) {
                            Ok(text) => text,
                            Err(err) => {
                                tracing::warn!(error = %err, "failed to serialize subscriber payload");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Pong(_))) => {
                        deadline.as_mut().reset(Instant::now() + read_deadline);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
