//! API v0 endpoints.
//!
//! Version 0 signals an unstable API -- breaking changes are expected
//! until the first release.

use axum::{Json, extract::State, http::StatusCode};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::server::SharedState;
use crate::api_client::types::{AlarmView, ConfigPatchRequest, ConfigState};
use crate::signal::Signal;
use crate::tracing::prelude::*;
use crate::trigger;

/// Build the v0 API routes with OpenAPI metadata.
pub fn routes() -> OpenApiRouter<SharedState> {
    OpenApiRouter::new()
        .routes(routes!(health))
        .routes(routes!(get_alarm))
        .routes(routes!(dismiss))
        .routes(routes!(get_config, patch_config))
        .routes(routes!(get_signals, put_signals))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = OK, description = "Server is running", body = String),
    ),
)]
async fn health() -> &'static str {
    "OK"
}

/// Return the current alarm state.
#[utoipa::path(
    get,
    path = "/alarm",
    tag = "alarm",
    responses(
        (status = OK, description = "Current alarm state", body = AlarmView),
    ),
)]
async fn get_alarm(State(state): State<SharedState>) -> Json<AlarmView> {
    Json(state.engine.view())
}

/// Ring off: silence the alarm and release the wake lock.
#[utoipa::path(
    post,
    path = "/alarm/dismiss",
    tag = "alarm",
    responses(
        (status = OK, description = "Alarm state after dismissal", body = AlarmView),
        (status = SERVICE_UNAVAILABLE, description = "Engine not running"),
    ),
)]
async fn dismiss(State(state): State<SharedState>) -> Result<Json<AlarmView>, StatusCode> {
    state.engine.dismiss().await.map(Json).map_err(|e| {
        error!(error = %e, "Dismiss failed");
        StatusCode::SERVICE_UNAVAILABLE
    })
}

fn config_state(state: &SharedState, view: &AlarmView) -> ConfigState {
    ConfigState {
        antidelay_secs: view.antidelay_secs,
        custom_sound: state.custom_sound,
    }
}

/// Return the current configuration.
#[utoipa::path(
    get,
    path = "/config",
    tag = "config",
    responses(
        (status = OK, description = "Current configuration", body = ConfigState),
    ),
)]
async fn get_config(State(state): State<SharedState>) -> Json<ConfigState> {
    let view = state.engine.view();
    Json(config_state(&state, &view))
}

/// Apply partial updates to the configuration.
#[utoipa::path(
    patch,
    path = "/config",
    tag = "config",
    request_body = ConfigPatchRequest,
    responses(
        (status = OK, description = "Updated configuration", body = ConfigState),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid value, e.g. negative antidelay"),
        (status = SERVICE_UNAVAILABLE, description = "Engine not running"),
    ),
)]
async fn patch_config(
    State(state): State<SharedState>,
    Json(req): Json<ConfigPatchRequest>,
) -> Result<Json<ConfigState>, StatusCode> {
    let view = match req.antidelay_secs {
        Some(antidelay) => state.engine.set_antidelay(antidelay).await.map_err(|e| {
            error!(error = %e, "Antidelay update failed");
            StatusCode::SERVICE_UNAVAILABLE
        })?,
        None => state.engine.view(),
    };

    Ok(Json(config_state(&state, &view)))
}

/// Return the signals still waiting to ring.
#[utoipa::path(
    get,
    path = "/signals",
    tag = "signals",
    responses(
        (status = OK, description = "Pending signals", body = Vec<Signal>),
        (status = INTERNAL_SERVER_ERROR, description = "Storage error"),
    ),
)]
async fn get_signals(State(state): State<SharedState>) -> Result<Json<Vec<Signal>>, StatusCode> {
    state.source.signals().await.map(Json).map_err(|e| {
        error!(error = %e, "Failed to read signals");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Replace the signal list.
#[utoipa::path(
    put,
    path = "/signals",
    tag = "signals",
    request_body = Vec<Signal>,
    responses(
        (status = OK, description = "Pending signals after the update", body = Vec<Signal>),
        (status = UNPROCESSABLE_ENTITY, description = "Timestamp negative or out of range for the antidelay"),
        (status = INTERNAL_SERVER_ERROR, description = "Storage error"),
        (status = SERVICE_UNAVAILABLE, description = "Engine not running"),
    ),
)]
async fn put_signals(
    State(state): State<SharedState>,
    Json(signals): Json<Vec<Signal>>,
) -> Result<Json<Vec<Signal>>, StatusCode> {
    let antidelay = state.engine.view().antidelay_secs;
    if let Some(rejected) = signals
        .iter()
        .find(|s| !trigger::is_schedulable(s, antidelay))
    {
        warn!(signal = %rejected, %antidelay, "Rejected unschedulable signal");
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let storage_error = |e: crate::error::Error| {
        error!(error = %e, "Failed to save signals");
        StatusCode::INTERNAL_SERVER_ERROR
    };

    state.source.save(signals).await.map_err(storage_error)?;
    let pending = state.source.signals().await.map_err(storage_error)?;

    state
        .engine
        .set_signals(pending.clone())
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to update engine signals");
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    Ok(Json(pending))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{Router, body::Body};
    use http::{Request, header};
    use http_body_util::BodyExt;
    use time::macros::datetime;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::super::router;
    use super::*;
    use crate::audio::fake::FakeAudioBackend;
    use crate::engine::{AlarmEngine, EngineParts, EngineSettings, ManualClock};
    use crate::keepalive::fake::FakeKeepAlive;
    use crate::signal::{AntidelaySeconds, Direction};
    use crate::store::MemoryStore;
    use crate::wake::fake::FakeWakePlatform;

    struct TestApi {
        router: Router,
        cancellation: CancellationToken,
    }

    impl Drop for TestApi {
        fn drop(&mut self) {
            self.cancellation.cancel();
        }
    }

    fn start() -> TestApi {
        let (_nudge_tx, nudge_rx) = mpsc::channel(1);
        let source = Arc::new(MemoryStore::default());
        let (engine, handle) = AlarmEngine::new(
            EngineSettings::default(),
            EngineParts {
                clock: Arc::new(ManualClock::new(datetime!(2024-03-01 11:00:00 UTC))),
                audio: Arc::new(FakeAudioBackend::default()),
                wake: Arc::new(FakeWakePlatform::default()),
                keepalive: Arc::new(FakeKeepAlive::default()),
                source: source.clone(),
                nudge_rx,
            },
        );

        let cancellation = CancellationToken::new();
        tokio::spawn(engine.run(cancellation.clone()));

        let state = SharedState {
            engine: handle,
            source,
            custom_sound: false,
        };

        TestApi {
            router: router(state),
            cancellation,
        }
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let api = start();
        let (status, body) = send(&api.router, get("/api/v0/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }

    #[tokio::test]
    async fn alarm_starts_idle() {
        let api = start();
        let (status, body) = send(&api.router, get("/api/v0/alarm")).await;
        assert_eq!(status, StatusCode::OK);

        let view: AlarmView = serde_json::from_slice(&body).unwrap();
        assert!(!view.ringing);
        assert_eq!(view.signal, None);
    }

    #[tokio::test]
    async fn dismiss_returns_idle_view() {
        let api = start();
        let request = Request::builder()
            .method("POST")
            .uri("/api/v0/alarm/dismiss")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(&api.router, request).await;
        assert_eq!(status, StatusCode::OK);

        let view: AlarmView = serde_json::from_slice(&body).unwrap();
        assert!(!view.ringing);
        assert!(view.dismiss_pressed);
    }

    #[tokio::test]
    async fn patch_config_sets_antidelay() {
        let api = start();
        let request = json_request(
            "PATCH",
            "/api/v0/config",
            serde_json::json!({ "antidelay_secs": 30 }),
        );

        let (status, body) = send(&api.router, request).await;
        assert_eq!(status, StatusCode::OK);

        let config: ConfigState = serde_json::from_slice(&body).unwrap();
        assert_eq!(config.antidelay_secs, AntidelaySeconds(30));
        assert!(!config.custom_sound);

        let (_, body) = send(&api.router, get("/api/v0/alarm")).await;
        let view: AlarmView = serde_json::from_slice(&body).unwrap();
        assert_eq!(view.antidelay_secs, AntidelaySeconds(30));
    }

    #[tokio::test]
    async fn negative_antidelay_is_rejected() {
        let api = start();
        let request = json_request(
            "PATCH",
            "/api/v0/config",
            serde_json::json!({ "antidelay_secs": -5 }),
        );

        let (status, _) = send(&api.router, request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn put_signals_round_trips_through_store() {
        let api = start();
        let signal = Signal::new("EURUSD", Direction::Up, datetime!(2024-03-01 12:00:00 UTC));
        let request = json_request(
            "PUT",
            "/api/v0/signals",
            serde_json::json!([{ "asset": "EURUSD", "direction": "up", "timestamp": 1709294400 }]),
        );

        let (status, body) = send(&api.router, request).await;
        assert_eq!(status, StatusCode::OK);
        let saved: Vec<Signal> = serde_json::from_slice(&body).unwrap();
        assert_eq!(saved, vec![signal.clone()]);

        let (_, body) = send(&api.router, get("/api/v0/signals")).await;
        let listed: Vec<Signal> = serde_json::from_slice(&body).unwrap();
        assert_eq!(listed, vec![signal]);
    }

    #[tokio::test]
    async fn unknown_direction_is_rejected() {
        let api = start();
        let request = json_request(
            "PUT",
            "/api/v0/signals",
            serde_json::json!([{ "asset": "EURUSD", "direction": "sideways", "timestamp": 1 }]),
        );

        let (status, _) = send(&api.router, request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    async fn put_single(api: &TestApi, timestamp: i64) -> StatusCode {
        let request = json_request(
            "PUT",
            "/api/v0/signals",
            serde_json::json!([{ "asset": "EURUSD", "direction": "up", "timestamp": timestamp }]),
        );
        send(&api.router, request).await.0
    }

    #[tokio::test]
    async fn negative_timestamp_is_rejected() {
        let api = start();
        assert_eq!(put_single(&api, -1).await, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            put_single(&api, -377705116800).await,
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let (_, body) = send(&api.router, get("/api/v0/signals")).await;
        let listed: Vec<Signal> = serde_json::from_slice(&body).unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn last_representable_second_is_rejected() {
        let api = start();
        assert_eq!(
            put_single(&api, 253402300799).await,
            StatusCode::UNPROCESSABLE_ENTITY
        );

        // The engine is still serving after the rejection.
        let (status, _) = send(&api.router, get("/api/v0/alarm")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(put_single(&api, 1709294400).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let api = start();
        let (status, body) = send(&api.router, get("/api-docs/openapi.json")).await;
        assert_eq!(status, StatusCode::OK);

        let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(doc["paths"]["/api/v0/alarm/dismiss"].is_object());
    }
}
