use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::command::{CommandAck, CommandError, CommandRouter};
use crate::history::{HistoryRepository, SensorReading};
use crate::snapshot::{SensorSnapshot, SnapshotStore};
use crate::stats::{BridgeStats, StatsView};

#[derive(Clone)]
pub struct HttpState {
    pub snapshot: SnapshotStore,
    pub history: Arc<dyn HistoryRepository>,
    pub commands: CommandRouter,
    pub stats: Arc<BridgeStats>,
    pub history_lookback: Duration,
}

/// JSON `{error}` body with a status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<CommandError> for ApiError {
    fn from(err: CommandError) -> Self {
        let status = match &err {
            CommandError::MissingDevice | CommandError::UnknownDevice(_) => StatusCode::BAD_REQUEST,
            CommandError::PublishFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.to_string())
    }
}

/// Toggle body as the dashboard sends it. Parsed by hand so every malformed
/// body still gets a JSON `{error}` response.
#[derive(Debug, PartialEq)]
struct ToggleRequest {
    device: String,
    state: bool,
}

impl ToggleRequest {
    fn parse(body: &[u8]) -> Result<Self, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(CommandError::MissingDevice.into());
        }
        let value: Value = serde_json::from_slice(body)
            .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "Invalid JSON body"))?;
        // A non-string device can never name a known device.
        let device = match value.get("device") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(name)) => name.clone(),
            Some(other) => other.to_string(),
        };
        let state = match value.get("state") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(text)) => !text.is_empty(),
            _ => false,
        };
        Ok(Self { device, state })
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_status(State(state): State<HttpState>) -> Json<StatsView> {
    Json(state.stats.view())
}

async fn get_current(State(state): State<HttpState>) -> Json<SensorSnapshot> {
    Json(state.snapshot.read())
}

async fn get_history(
    State(state): State<HttpState>,
) -> Result<Json<Vec<SensorReading>>, ApiError> {
    let to = Utc::now();
    let lookback = ChronoDuration::from_std(state.history_lookback).map_err(|err| {
        tracing::error!(error=%err, "history lookback out of range");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch historical data")
    })?;
    let readings = state
        .history
        .query_range(to - lookback, to)
        .await
        .map_err(|err| {
            tracing::error!(error=%err, "failed to fetch historical data");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch historical data")
        })?;
    Ok(Json(readings))
}

async fn post_toggle(
    State(state): State<HttpState>,
    body: Bytes,
) -> Result<Json<CommandAck>, ApiError> {
    let request = ToggleRequest::parse(&body)?;
    let ack = state.commands.toggle(&request.device, request.state).await?;
    Ok(Json(ack))
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/status", get(get_status))
        .route("/api/sensor/current", get(get_current))
        .route("/api/sensor/history", get(get_history))
        .route("/api/control/toggle", post(post_toggle))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tests::RecordingPublisher;
    use crate::gate::tests::FlakyHistory;
    use crate::history::MemoryHistoryRepository;
    use crate::snapshot::Quantity;
    use crate::topic::TopicLayout;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    fn state_with(
        history: Arc<dyn HistoryRepository>,
        publisher: Arc<RecordingPublisher>,
    ) -> HttpState {
        let snapshot = SnapshotStore::new(SensorSnapshot::new(51.0, Utc::now()));
        HttpState {
            snapshot,
            history,
            commands: CommandRouter::new(publisher, TopicLayout::default()),
            stats: Arc::new(BridgeStats::new()),
            history_lookback: Duration::from_secs(24 * 3600),
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn toggle_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/control/toggle")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn current_returns_live_snapshot() {
        let state = state_with(
            Arc::new(MemoryHistoryRepository::new()),
            Arc::new(RecordingPublisher::default()),
        );
        state.snapshot.update(Quantity::Temperature, 22.5);

        let (status, body) = send(router(state), get_request("/api/sensor/current")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["temperature"], 22.5);
        assert_eq!(body["energyUsage"], 51.0);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn history_returns_lookback_window_ascending() {
        let history = Arc::new(MemoryHistoryRepository::new());
        let now = Utc::now();
        for hours_ago in [30, 2, 5] {
            history
                .append(&SensorReading {
                    temperature: hours_ago as f64,
                    humidity: 1.0,
                    air_quality: 2.0,
                    timestamp: now - ChronoDuration::hours(hours_ago),
                })
                .await
                .unwrap();
        }
        let state = state_with(history, Arc::new(RecordingPublisher::default()));

        let (status, body) = send(router(state), get_request("/api/sensor/history")).await;
        assert_eq!(status, StatusCode::OK);
        let temps: Vec<f64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["temperature"].as_f64().unwrap())
            .collect();
        assert_eq!(temps, vec![5.0, 2.0]);
    }

    #[tokio::test]
    async fn history_store_failure_is_500() {
        let history = Arc::new(FlakyHistory::default());
        history.failing.store(true, Ordering::SeqCst);
        let state = state_with(history, Arc::new(RecordingPublisher::default()));

        let (status, body) = send(router(state), get_request("/api/sensor/history")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to fetch historical data");
    }

    #[tokio::test]
    async fn toggle_success_echoes_command() {
        let publisher = Arc::new(RecordingPublisher::default());
        let state = state_with(Arc::new(MemoryHistoryRepository::new()), publisher.clone());

        let (status, body) = send(
            router(state),
            toggle_request(r#"{"device":"kitchenLight","state":true}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "success": true, "device": "kitchenLight", "state": true })
        );
        assert_eq!(
            *publisher.sent.lock(),
            vec![("control/light/kitchen".to_string(), b"1".to_vec())]
        );
    }

    #[tokio::test]
    async fn toggle_rejects_missing_and_unknown_device() {
        let publisher = Arc::new(RecordingPublisher::default());
        let state = state_with(Arc::new(MemoryHistoryRepository::new()), publisher.clone());

        let (status, body) = send(router(state.clone()), toggle_request(r#"{"state":true}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Device name is required");

        let (status, body) = send(
            router(state),
            toggle_request(r#"{"device":"garageDoor","state":true}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unknown device");
        assert!(publisher.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn toggle_malformed_bodies_get_json_errors() {
        let publisher = Arc::new(RecordingPublisher::default());
        let state = state_with(Arc::new(MemoryHistoryRepository::new()), publisher.clone());

        let empty = Request::builder()
            .method("POST")
            .uri("/api/control/toggle")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(router(state.clone()), empty).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Device name is required");

        let (status, body) =
            send(router(state.clone()), toggle_request(r#"{"device":123,"state":true}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unknown device");

        let (status, body) = send(router(state.clone()), toggle_request(r#"{"state":1}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Device name is required");

        let (status, body) = send(router(state), toggle_request("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid JSON body");

        assert!(publisher.sent.lock().is_empty());
    }

    #[test]
    fn toggle_state_follows_json_truthiness() {
        let parse = |raw: &str| ToggleRequest::parse(raw.as_bytes()).unwrap().state;
        assert!(parse(r#"{"device":"airConditioner","state":true}"#));
        assert!(parse(r#"{"device":"airConditioner","state":1}"#));
        assert!(!parse(r#"{"device":"airConditioner","state":0}"#));
        assert!(!parse(r#"{"device":"airConditioner"}"#));
        assert!(!parse(r#"{"device":"airConditioner","state":null}"#));
    }

    #[tokio::test]
    async fn toggle_publish_failure_is_500() {
        let publisher = Arc::new(RecordingPublisher {
            fail: true,
            ..Default::default()
        });
        let state = state_with(Arc::new(MemoryHistoryRepository::new()), publisher);

        let (status, body) = send(
            router(state),
            toggle_request(r#"{"device":"bedroomLight","state":false}"#),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to send command");
    }

    #[tokio::test]
    async fn status_reports_counters() {
        let state = state_with(
            Arc::new(MemoryHistoryRepository::new()),
            Arc::new(RecordingPublisher::default()),
        );
        BridgeStats::incr(&state.stats.messages_received);

        let (status, body) = send(router(state), get_request("/api/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messages_received"], 1);
        assert_eq!(body["mqtt_connected"], false);
    }
}
