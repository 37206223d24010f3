//! HTTP control surface: watcher status and restart, the log-stream
//! WebSocket, and the tabular changes endpoint consumed by the UI.

use crate::broadcast::{LogBroadcaster, Subscription};
use crate::supervisor::WatcherSupervisor;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fluxwatch_core::{SidecarConfig, WatcherStatus};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<WatcherSupervisor>,
    pub broadcaster: Arc<LogBroadcaster>,
    pub config: SidecarConfig,
    pub data_dir: PathBuf,
}

pub fn router(state: AppState) -> Router {
    // Any origin: the UI may load from a packaged webview or a dev server.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/watch/status", get(watch_status))
        .route("/api/watch/restart", post(watch_restart))
        .route("/api/watch/logs", get(watch_logs))
        .route("/api/changes/json", get(changes_json))
        .layer(cors)
        .with_state(state)
}

/// Wire representation of the watcher state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WatchStatusResponse {
    NotRunning,
    Running { pid: u32 },
    Stopped { return_code: i32 },
}

impl From<WatcherStatus> for WatchStatusResponse {
    fn from(status: WatcherStatus) -> Self {
        match status {
            WatcherStatus::NotStarted => WatchStatusResponse::NotRunning,
            WatcherStatus::Running { pid } => WatchStatusResponse::Running { pid },
            WatcherStatus::Stopped { exit_code } => WatchStatusResponse::Stopped {
                return_code: exit_code,
            },
            // Signal deaths surface the negative signal number, matching
            // what a POSIX wait would report to the original UI.
            WatcherStatus::Killed { signal } => WatchStatusResponse::Stopped {
                return_code: signal.map(|s| -s).unwrap_or(-1),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct RestartResponse {
    status: &'static str,
    pid: u32,
}

/// Error payload shape shared by every route
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

async fn watch_status(State(state): State<AppState>) -> Json<WatchStatusResponse> {
    Json(state.supervisor.status().await.into())
}

async fn watch_restart(
    State(state): State<AppState>,
) -> Result<Json<RestartResponse>, ApiError> {
    match state.supervisor.restart().await {
        Ok(WatcherStatus::Running { pid }) => Ok(Json(RestartResponse {
            status: "restarted",
            pid,
        })),
        Ok(status) => Err(ApiError::internal(format!(
            "watcher did not come up: {status}"
        ))),
        Err(e) => Err(ApiError::internal(e.to_string())),
    }
}

async fn watch_logs(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| stream_logs(socket, state))
}

/// Drive one log subscriber: the receiver arrives pre-loaded with the
/// history replay, after which live lines flow until either side goes
/// away. A quiet stretch produces a keepalive line instead.
async fn stream_logs(mut socket: WebSocket, state: AppState) {
    let Subscription { id, mut receiver } = state.broadcaster.subscribe();
    debug!(subscriber = id, "Log subscriber connected");

    let keepalive = state.config.keepalive();
    loop {
        match tokio::time::timeout(keepalive, receiver.recv()).await {
            Ok(Some(entry)) => {
                if socket.send(Message::Text(entry.render().into())).await.is_err() {
                    break;
                }
            }
            // Channel closed: the broadcaster pruned this subscriber.
            Ok(None) => break,
            Err(_) => {
                if socket.send(Message::Text("ping".into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.broadcaster.unsubscribe(id);
    debug!(subscriber = id, "Log subscriber disconnected");
}

async fn changes_json(
    State(state): State<AppState>,
) -> Result<Json<Vec<Map<String, Value>>>, ApiError> {
    let path = state.data_dir.join("changes.csv");
    if !path.exists() {
        return Err(ApiError::not_found("CSV file not found"));
    }

    let records = tokio::task::spawn_blocking(move || crate::changes::read_changes(&path))
        .await
        .map_err(|e| ApiError::internal(format!("Error reading CSV: {e}")))?
        .map_err(|e| {
            warn!(error = %e, "Failed to read changes file");
            ApiError::internal(format!("Error reading CSV: {e}"))
        })?;
    Ok(Json(records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        let response = WatchStatusResponse::from(WatcherStatus::NotStarted);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "status": "not_running" })
        );

        let response = WatchStatusResponse::from(WatcherStatus::Running { pid: 7 });
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "status": "running", "pid": 7 })
        );

        let response = WatchStatusResponse::from(WatcherStatus::Stopped { exit_code: 2 });
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "status": "stopped", "return_code": 2 })
        );
    }

    #[test]
    fn test_killed_maps_to_negative_signal() {
        let response = WatchStatusResponse::from(WatcherStatus::Killed { signal: Some(9) });
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "status": "stopped", "return_code": -9 })
        );

        let response = WatchStatusResponse::from(WatcherStatus::Killed { signal: None });
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "status": "stopped", "return_code": -1 })
        );
    }

    #[cfg(unix)]
    mod routes {
        use super::super::*;
        use axum::body::Body;
        use axum::http::Request;
        use tower::ServiceExt;

        fn test_state(data_dir: PathBuf) -> AppState {
            let config = SidecarConfig::builder()
                .watcher_command("sleep")
                .watcher_args(["10"])
                .build()
                .unwrap();
            let broadcaster = Arc::new(LogBroadcaster::new(
                config.history_capacity,
                config.subscriber_buffer,
            ));
            let supervisor = Arc::new(WatcherSupervisor::new(config.clone(), broadcaster.clone()));
            AppState {
                supervisor,
                broadcaster,
                config,
                data_dir,
            }
        }

        #[tokio::test]
        async fn test_status_route_before_start() {
            let tmp = tempfile::tempdir().unwrap();
            let app = router(test_state(tmp.path().to_path_buf()));

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/api/watch/status")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
            let value: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(value, json!({ "status": "not_running" }));
        }

        #[tokio::test]
        async fn test_changes_route_missing_file() {
            let tmp = tempfile::tempdir().unwrap();
            let app = router(test_state(tmp.path().to_path_buf()));

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/api/changes/json")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_changes_route_renders_records() {
            let tmp = tempfile::tempdir().unwrap();
            std::fs::write(tmp.path().join("changes.csv"), "symbol,change\nABC,\n").unwrap();
            let app = router(test_state(tmp.path().to_path_buf()));

            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/api/changes/json")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
            let value: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(value, json!([{ "symbol": "ABC", "change": null }]));
        }
    }
}
