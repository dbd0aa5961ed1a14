//! Axum-based local HTTP control and status API

use crate::config::Config;
use crate::controller::{RequestResult, RequestSource};
use crate::driver::{DriverCommand, StatusSnapshot};
use crate::error::{EvseError, Result};
use crate::hardware::SimInputs;
use crate::transaction::TransactionStatus;
use axum::body::Bytes;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub commands: mpsc::UnboundedSender<DriverCommand>,
    pub status: watch::Receiver<Arc<StatusSnapshot>>,
    pub config: Arc<Config>,
}

#[derive(Deserialize)]
pub struct EnableBody {
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct CurrentBody {
    pub amps: i32,
}

#[derive(Deserialize, Default)]
pub struct RemoteStartBody {
    #[serde(default)]
    pub amps: Option<i32>,
}

fn driver_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({"ok": false, "reason": "driver unavailable"})),
    )
        .into_response()
}

fn accepted() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"ok": true}))).into_response()
}

fn request_outcome(result: RequestResult) -> Response {
    match result {
        Ok(()) => accepted(),
        Err(r) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "ok": false,
                "reason": r.to_string(),
                "code": r,
            })),
        )
            .into_response(),
    }
}

/// Send a command carrying a reply channel and wait for the answer
async fn ask<T>(
    state: &AppState,
    build: impl FnOnce(oneshot::Sender<T>) -> DriverCommand,
) -> std::result::Result<T, Response> {
    let (tx, rx) = oneshot::channel();
    state
        .commands
        .send(build(tx))
        .map_err(|_| driver_unavailable())?;
    rx.await.map_err(|_| driver_unavailable())
}

fn tell(state: &AppState, cmd: DriverCommand) -> Response {
    match state.commands.send(cmd) {
        Ok(()) => accepted(),
        Err(_) => driver_unavailable(),
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = Arc::clone(&state.status.borrow());
    Json(StatusSnapshot::clone(&snapshot))
}

async fn sessions(State(state): State<AppState>) -> Response {
    match ask(&state, |reply| DriverCommand::GetSessions { reply }).await {
        Ok(list) => Json(list).into_response(),
        Err(resp) => resp,
    }
}

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.config.as_ref().clone())
}

async fn set_enabled(State(state): State<AppState>, Json(body): Json<EnableBody>) -> Response {
    tell(&state, DriverCommand::SetEnabled(body.enabled))
}

async fn set_current(State(state): State<AppState>, Json(body): Json<CurrentBody>) -> Response {
    match ask(&state, |reply| DriverCommand::SetCurrentLimit {
        amps: body.amps,
        reply,
    })
    .await
    {
        Ok(applied) => (
            StatusCode::OK,
            Json(serde_json::json!({"ok": true, "applied_amps": applied})),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

async fn start(State(state): State<AppState>) -> Response {
    match ask(&state, |reply| DriverCommand::StartCharging {
        source: RequestSource::Api,
        reply,
    })
    .await
    {
        Ok(result) => request_outcome(result),
        Err(resp) => resp,
    }
}

async fn remote_start(State(state): State<AppState>, body: Bytes) -> Response {
    let body: RemoteStartBody = if body.is_empty() {
        RemoteStartBody::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(b) => b,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"ok": false, "reason": e.to_string()})),
                )
                    .into_response();
            }
        }
    };
    match ask(&state, |reply| DriverCommand::StartChargingRemote {
        source: RequestSource::Api,
        limit_amps: body.amps,
        reply,
    })
    .await
    {
        Ok(result) => request_outcome(result),
        Err(resp) => resp,
    }
}

async fn stop(State(state): State<AppState>) -> Response {
    match ask(&state, |reply| DriverCommand::StopCharging {
        source: RequestSource::Api,
        reply,
    })
    .await
    {
        Ok(result) => request_outcome(result),
        Err(resp) => resp,
    }
}

async fn acknowledge_fault(State(state): State<AppState>) -> Response {
    match ask(&state, |reply| DriverCommand::AcknowledgeFault { reply }).await {
        Ok(result) => request_outcome(result),
        Err(resp) => resp,
    }
}

async fn transaction(
    State(state): State<AppState>,
    Json(body): Json<TransactionStatus>,
) -> Response {
    tell(&state, DriverCommand::Transaction(body))
}

async fn simulate(State(state): State<AppState>, Json(body): Json<SimInputs>) -> Response {
    tell(&state, DriverCommand::Simulate(body))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/sessions", get(sessions))
        .route("/api/config", get(get_config))
        .route("/api/enable", post(set_enabled))
        .route("/api/current", post(set_current))
        .route("/api/start", post(start))
        .route("/api/remote_start", post(remote_start))
        .route("/api/stop", post(stop))
        .route("/api/fault/ack", post(acknowledge_fault))
        .route("/api/transaction", post(transaction))
        .route("/api/simulate", post(simulate))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let router = build_router(state);

    let logger = crate::logging::get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={}, port={}",
        host, port
    ));

    let addr: SocketAddr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!(
                "Invalid host '{}'; falling back to 127.0.0.1",
                host
            ));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| EvseError::web(format!("Failed to bind {}: {}", addr, e)))?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{}",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router)
        .await
        .map_err(|e| EvseError::web(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::EvseDriver;
    use crate::hardware::{SimulatedHardware, SystemClock};
    use crate::meter::SimulatedMeter;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(dir: &tempfile::TempDir) -> (Router, mpsc::UnboundedSender<DriverCommand>) {
        let mut config = Config::default();
        config.state_file = dir.path().join("state.json").display().to_string();

        let (hw, sim) = SimulatedHardware::new(config.pilot.adc_to_voltage);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut driver = EvseDriver::new(
            config.clone(),
            Box::new(hw),
            Box::new(SimulatedMeter::from_config(&config.meter)),
            Arc::new(SystemClock::new()),
            rx,
        )
        .with_simulator(sim);
        let status = driver.subscribe_snapshot();
        tokio::spawn(async move { driver.run().await });

        let state = AppState {
            commands: tx.clone(),
            status,
            config: Arc::new(config),
        };
        (build_router(state), tx)
    }

    async fn post_json(router: &Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_ok() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _tx) = app(&dir);
        let resp = router
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn current_limit_is_clamped_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _tx) = app(&dir);
        let (status, body) = post_json(&router, "/api/current", r#"{"amps":100}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applied_amps"], 32);
    }

    #[tokio::test]
    async fn stop_while_idle_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _tx) = app(&dir);
        let (status, body) = post_json(&router, "/api/stop", "").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["ok"], false);
        assert_eq!(body["code"], "not_charging");
    }

    #[tokio::test]
    async fn remote_start_after_plug_in() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _tx) = app(&dir);

        let (status, _) = post_json(&router, "/api/remote_start", "").await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = post_json(&router, "/api/simulate", r#"{"cp_voltage":6.0}"#).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            post_json(&router, "/api/remote_start", r#"{"amps":20}"#).await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    #[tokio::test]
    async fn driver_gone_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (router, tx) = app(&dir);
        tx.send(DriverCommand::Shutdown).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let (status, _) = post_json(&router, "/api/start", "").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
