//! HTTP control surface
//!
//! Start/stop/status for the cycle orchestrator plus read-only model and
//! signal endpoints. Every response is JSON except `/health`.

use crate::cycle::{CycleOrchestrator, CycleState, SignalReport};
use crate::engine::ModelStat;
use crate::error::OracleError;
use crate::patterns::PatternId;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// State shared across handlers
pub struct AppState {
    pub orchestrator: Arc<CycleOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<CycleOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub details: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(status: StatusCode, error: &str, details: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            success: false,
            error: error.to_string(),
            details: details.into(),
        }),
    )
}

fn status_for(e: &OracleError) -> StatusCode {
    match e {
        OracleError::NoData(_) => StatusCode::NOT_FOUND,
        OracleError::DataFetch { .. } | OracleError::Http(_) => StatusCode::BAD_GATEWAY,
        OracleError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub success: bool,
    pub message: String,
    pub is_running: bool,
    pub cycle_count: u64,
    pub best_accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub is_running: bool,
    #[serde(flatten)]
    pub state: CycleState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    pub success: bool,
    pub message: String,
    pub is_running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatsResponse {
    pub success: bool,
    pub patterns: BTreeMap<PatternId, ModelStat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalResponse {
    pub success: bool,
    pub signal: SignalReport,
}

async fn start_cycles(State(state): State<Arc<AppState>>) -> Json<StartResponse> {
    let was_running = state.orchestrator.status().is_running();
    let current = state.orchestrator.start().await;
    let message = if was_running {
        "Cycles already running"
    } else {
        "Cycles started"
    };

    Json(StartResponse {
        success: true,
        message: message.to_string(),
        is_running: current.is_running(),
        cycle_count: current.cycle_count,
        best_accuracy: current.best_accuracy,
    })
}

async fn cycle_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let current = state.orchestrator.status();
    Json(StatusResponse {
        success: true,
        is_running: current.is_running(),
        state: current,
    })
}

async fn stop_cycles(State(state): State<Arc<AppState>>) -> Json<StopResponse> {
    let stopped = state.orchestrator.stop().await;
    Json(StopResponse {
        success: true,
        message: "Cycles stopped".to_string(),
        is_running: stopped.is_running(),
    })
}

async fn model_stats(State(state): State<Arc<AppState>>) -> Json<ModelStatsResponse> {
    Json(ModelStatsResponse {
        success: true,
        patterns: state.orchestrator.model_stats(),
    })
}

async fn get_signal(
    State(state): State<Arc<AppState>>,
    Path(instrument): Path<String>,
) -> ApiResult<SignalResponse> {
    let instrument = instrument.trim().to_uppercase();
    if instrument.is_empty() || !instrument.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Invalid instrument",
            format!("{:?} is not a symbol", instrument),
        ));
    }

    match state.orchestrator.signal(&instrument).await {
        Ok(signal) => Ok(Json(SignalResponse { success: true, signal })),
        Err(e) => {
            tracing::warn!("Signal for {} failed: {}", instrument, e);
            Err(api_error(status_for(&e), "Failed to compute signal", e.to_string()))
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}

/// Create the control router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/cycle/start", post(start_cycles))
        .route("/cycle/status", get(cycle_status))
        .route("/cycle/stop", delete(stop_cycles))
        .route("/model/stats", get(model_stats))
        .route("/signal/{instrument}", get(get_signal))
        .with_state(state)
}

/// Serve the control surface until `shutdown` resolves
pub async fn start_server(
    state: Arc<AppState>,
    host: &str,
    port: u16,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🌐 Control server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
