//! API handlers for the compliance API
//!
//! Provides REST endpoints for:
//! - Scan triggering
//! - Result ingestion and queries
//! - Aggregate statistics
//! - Operator learnings

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use compliance_graph::{
    ComplianceResult, ComplianceStats, GraphError, IngestOutcome, Learning, LearningQuery,
    NewLearning, ResultQuery, StatsQuery,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::AppState;
use crate::trigger::{ScanPayload, ScanRequest};

pub const DEGRADED_HEADER: &str = "x-compliance-degraded";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "compliance-api",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct TriggerResponse {
    pub status: &'static str,
    pub message: String,
    pub payload: ScanPayload,
}

/// Handler: POST /compliance/check
pub async fn handle_trigger_scan(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ScanRequest>,
) -> Result<Json<TriggerResponse>, ApiError> {
    let payload = req.into_payload()?;
    info!(
        "Scan requested: {:?} on {} ({} pages)",
        payload.mode, payload.marketplace, payload.max_pages
    );

    state.trigger.fire(payload.clone());

    Ok(Json(TriggerResponse {
        status: "initiated",
        message: "Compliance check initiated successfully".to_string(),
        payload,
    }))
}

/// Serve a stand-in body when the store is down and degraded reads are on
fn degrade<T, B>(
    state: &AppState,
    outcome: Result<T, GraphError>,
    fallback: B,
    what: &str,
) -> Result<Response, ApiError>
where
    T: Serialize,
    B: Serialize,
{
    match outcome {
        Ok(body) => Ok(Json(body).into_response()),
        Err(err) if state.degraded_reads && err.is_unavailable() => {
            warn!("Serving degraded {}: {}", what, err);
            Ok(([(DEGRADED_HEADER, "true")], Json(fallback)).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

/// Handler: GET /compliance/results
pub async fn handle_list_results(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ResultQuery>,
) -> Result<Response, ApiError> {
    let outcome = state.store.list_results(&query).await;
    degrade(&state, outcome, Vec::<ComplianceResult>::new(), "result list")
}

/// Handler: POST /compliance/results
///
/// 201 when this call recorded the check, 200 when it was already stored.
pub async fn handle_ingest_result(
    State(state): State<AppState>,
    ApiJson(result): ApiJson<ComplianceResult>,
) -> Result<(StatusCode, Json<ComplianceResult>), ApiError> {
    let (stored, outcome) = state.store.ingest_with_outcome(result).await?;
    let status = match outcome {
        IngestOutcome::Created => StatusCode::CREATED,
        IngestOutcome::AlreadyRecorded => StatusCode::OK,
    };
    Ok((status, Json(stored)))
}

/// Handler: GET /compliance/results/:check_id
pub async fn handle_get_result(
    State(state): State<AppState>,
    Path(check_id): Path<String>,
) -> Result<Json<ComplianceResult>, ApiError> {
    Ok(Json(state.store.get_result(&check_id).await?))
}

/// Handler: GET /compliance/stats
pub async fn handle_stats(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<StatsQuery>,
) -> Result<Response, ApiError> {
    let outcome = state.store.compute_stats(&query).await;
    degrade(&state, outcome, ComplianceStats::default(), "stats")
}

/// Handler: GET /compliance/learnings
pub async fn handle_list_learnings(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LearningQuery>,
) -> Result<Json<Vec<Learning>>, ApiError> {
    Ok(Json(state.store.list_learnings(&query).await?))
}

/// Handler: POST /compliance/learnings
pub async fn handle_create_learning(
    State(state): State<AppState>,
    ApiJson(new): ApiJson<NewLearning>,
) -> Result<Json<Learning>, ApiError> {
    Ok(Json(state.store.create_learning(new).await?))
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub status: &'static str,
    pub learning_id: String,
}

/// Handler: DELETE /compliance/learnings/:learning_id
pub async fn handle_delete_learning(
    State(state): State<AppState>,
    Path(learning_id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.store.delete_learning(&learning_id).await?;
    Ok(Json(DeleteResponse {
        status: "deleted",
        learning_id,
    }))
}

#[derive(Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub asin: String,
    pub violation_score: u8,
    pub timestamp: String,
}

/// Handler: POST /compliance/webhook/result
///
/// Workflow callback carrying a finished analysis.
pub async fn handle_webhook_result(
    State(state): State<AppState>,
    ApiJson(result): ApiJson<ComplianceResult>,
) -> Result<Json<WebhookAck>, ApiError> {
    info!("Received compliance result from workflow: {}", result.asin);
    let stored = state.store.ingest(result).await?;

    Ok(Json(WebhookAck {
        status: "received",
        asin: stored.asin,
        violation_score: stored.violation_score,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    }))
}
