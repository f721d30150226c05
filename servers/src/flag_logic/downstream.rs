use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use lib_common::core::{OrchestratorHandle, StatusSnapshot};
use lib_common::ingestors::{FeedKind, FlagCode};
use lib_common::loggers::LogBuffer;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Shared state of the control API handlers.
#[derive(Clone)]
pub struct AppState {
    orchestrator: OrchestratorHandle,
    logs: LogBuffer,
    bulb_address: Arc<RwLock<String>>,
}

impl AppState {
    pub fn new(orchestrator: OrchestratorHandle, logs: LogBuffer, bulb_address: String) -> Self {
        Self {
            orchestrator,
            logs,
            bulb_address: Arc::new(RwLock::new(bulb_address)),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    status: StatusSnapshot,
    selected_feed: FeedKind,
    last_log: Option<String>,
    logs: Vec<String>,
    bulb_address: String,
}

#[derive(Debug, Deserialize)]
struct FeedRequest {
    feed: String,
}

#[derive(Debug, Deserialize)]
struct TestColorRequest {
    // A string or a number; the UI sends both.
    #[serde(default)]
    code: Value,
}

#[derive(Debug, Deserialize)]
struct AddressRequest {
    ip: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/feed", post(feed_handler))
        .route("/api/test_color", post(test_color_handler))
        .route("/api/config/ip", post(address_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

pub async fn run(port: u16, state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Control API listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            log::info!("Control API shutting down.");
        })
        .await?;
    Ok(())
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let response = StatusResponse {
        status: state.orchestrator.status(),
        selected_feed: state.orchestrator.selected_feed(),
        last_log: state.logs.last(),
        logs: state.logs.lines(),
        bulb_address: state.bulb_address.read().await.clone(),
    };
    Json(response)
}

async fn feed_handler(State(state): State<AppState>, Json(request): Json<FeedRequest>) -> impl IntoResponse {
    match request.feed.parse::<FeedKind>() {
        Ok(kind) => {
            state.orchestrator.select_feed(kind);
            state.logs.push(&format!("Switched to {kind} feed"));
            (StatusCode::OK, Json(json!({"success": true, "feed": kind})))
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "message": e.to_string()})),
        ),
    }
}

async fn test_color_handler(
    State(state): State<AppState>,
    Json(request): Json<TestColorRequest>,
) -> impl IntoResponse {
    let Some(code) = FlagCode::from_value(&request.code) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "message": "Status code is required"})),
        );
    };
    let success = state.orchestrator.test_color(code).await;
    (StatusCode::OK, Json(json!({ "success": success })))
}

async fn address_handler(State(state): State<AppState>, Json(request): Json<AddressRequest>) -> impl IntoResponse {
    let ip = request.ip.trim().to_string();
    if ip.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "message": "IP address cannot be empty"})),
        );
    }

    *state.bulb_address.write().await = ip.clone();
    let success = state.orchestrator.update_address(ip.clone()).await;
    let message = if success {
        format!("Connected to bulb at {ip}")
    } else {
        format!("Could not connect to bulb at {ip}")
    };
    (StatusCode::OK, Json(json!({"success": success, "message": message})))
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_common::actuators::{ColorTables, KasaBulb};
    use lib_common::core::Orchestrator;
    use lib_common::ingestors::FeedSettings;

    /// Serves the API for a handle whose orchestrator was never started.
    async fn serve() -> (String, OrchestratorHandle) {
        let colors = Arc::new(ColorTables::default());
        let logs = LogBuffer::default();
        let (orchestrator, handle) = Orchestrator::new(
            Box::new(FeedSettings::default()),
            KasaBulb::new("", colors.clone()),
            colors,
            FeedKind::F1,
            logs.sink(),
        );
        drop(orchestrator);

        let state = AppState::new(handle.clone(), logs, "10.0.0.5".to_string());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, router(state)).await.unwrap() });
        (base, handle)
    }

    #[tokio::test]
    async fn status_reports_snapshot_and_address() {
        let (base, _handle) = serve().await;
        let body: Value = reqwest::get(format!("{base}/api/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["active_feed"], "f1");
        assert_eq!(body["selected_feed"], "f1");
        assert_eq!(body["feed_connected"], false);
        assert_eq!(body["bulb_address"], "10.0.0.5");
        assert!(body["current"].is_null());
    }

    #[tokio::test]
    async fn feed_selection_validates_the_name() {
        let (base, handle) = serve().await;
        let client = reqwest::Client::new();

        let ok = client
            .post(format!("{base}/api/feed"))
            .json(&json!({"feed": "nascar"}))
            .send()
            .await
            .unwrap();
        assert_eq!(ok.status(), 200);
        assert_eq!(handle.selected_feed(), FeedKind::Nascar);

        let bad = client
            .post(format!("{base}/api/feed"))
            .json(&json!({"feed": "indycar"}))
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), 400);
        assert_eq!(handle.selected_feed(), FeedKind::Nascar);
    }

    #[tokio::test]
    async fn empty_ip_is_rejected() {
        let (base, _handle) = serve().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/api/config/ip"))
            .json(&json!({"ip": "  "}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn requests_without_a_running_orchestrator_fail_softly() {
        let (base, _handle) = serve().await;
        let client = reqwest::Client::new();

        let body: Value = client
            .post(format!("{base}/api/test_color"))
            .json(&json!({"code": "1"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], false);

        let health = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(health.text().await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn test_color_accepts_numeric_codes_and_rejects_empty_ones() {
        let (base, _handle) = serve().await;
        let client = reqwest::Client::new();

        let numeric = client
            .post(format!("{base}/api/test_color"))
            .json(&json!({"code": 2}))
            .send()
            .await
            .unwrap();
        assert_eq!(numeric.status(), 200);
        let body: Value = numeric.json().await.unwrap();
        assert_eq!(body["success"], false);

        for bad in [json!({"code": ""}), json!({})] {
            let response = client
                .post(format!("{base}/api/test_color"))
                .json(&bad)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 400, "body {bad}");
        }
    }
}
