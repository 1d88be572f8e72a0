// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tour execution routes.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::TourExecution;
use crate::routes::position::CoordinatesRequest;
use crate::routes::tours::KeyPointDto;
use crate::routes::{ApiJson, ApiResponse};
use crate::services::ProximityReport;
use crate::time_utils::{format_opt_utc_rfc3339, format_utc_rfc3339};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/executions", get(list_executions))
        .route("/api/executions/{id}", get(get_execution))
        .route("/api/executions/{id}/proximity", post(check_proximity))
        .route("/api/executions/{id}/complete", post(complete))
        .route("/api/executions/{id}/abandon", post(abandon))
}

// ─── DTOs ────────────────────────────────────────────────────

#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CompletedKeyPointDto {
    pub key_point_id: String,
    pub completed_at: String,
}

#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ExecutionResponse {
    pub id: String,
    pub tour_id: String,
    /// `active`, `completed` or `abandoned`
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub last_activity_at: String,
    pub start_latitude: f64,
    pub start_longitude: f64,
    pub completed_key_points: Vec<CompletedKeyPointDto>,
}

impl From<&TourExecution> for ExecutionResponse {
    fn from(execution: &TourExecution) -> Self {
        Self {
            id: execution.id.clone(),
            tour_id: execution.tour_id.clone(),
            status: execution.status.as_str().to_string(),
            started_at: format_utc_rfc3339(execution.started_at),
            completed_at: format_opt_utc_rfc3339(execution.completed_at),
            last_activity_at: format_utc_rfc3339(execution.last_activity_at),
            start_latitude: execution.start_position.latitude,
            start_longitude: execution.start_position.longitude,
            completed_key_points: execution
                .completed_key_points
                .iter()
                .map(|c| CompletedKeyPointDto {
                    key_point_id: c.key_point_id.clone(),
                    completed_at: format_utc_rfc3339(c.completed_at),
                })
                .collect(),
        }
    }
}

#[derive(Serialize, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ProximityResponse {
    pub near_key_point: bool,
    pub key_point: Option<KeyPointDto>,
    pub distance_meters: Option<f64>,
    pub completed_count: usize,
    pub total_count: usize,
}

impl From<ProximityReport> for ProximityResponse {
    fn from(report: ProximityReport) -> Self {
        Self {
            near_key_point: report.near_key_point,
            key_point: report.nearby_key_point.as_ref().map(KeyPointDto::from),
            distance_meters: report.distance_meters,
            completed_count: report.completed_count,
            total_count: report.total_count,
        }
    }
}

#[derive(Deserialize)]
struct ListQuery {
    /// Only return active executions
    #[serde(default)]
    active: bool,
}

// ─── Handlers ────────────────────────────────────────────────

async fn list_executions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<ExecutionResponse>>>> {
    let executions = state
        .executions
        .list_executions(&user.user_id, params.active)
        .await?;
    Ok(ApiResponse::ok(
        format!("{} execution(s)", executions.len()),
        executions.iter().map(ExecutionResponse::from).collect(),
    ))
}

async fn get_execution(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ExecutionResponse>>> {
    let execution = state.executions.get_execution(&id, &user.user_id).await?;
    Ok(ApiResponse::ok(
        "Execution loaded",
        ExecutionResponse::from(&execution),
    ))
}

async fn check_proximity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CoordinatesRequest>,
) -> Result<Json<ApiResponse<ProximityResponse>>> {
    let report = state
        .executions
        .check_proximity(&id, &user.user_id, body.into())
        .await?;

    let message = match &report.nearby_key_point {
        Some(kp) => format!("Key point reached: {}", kp.name),
        None => "No key point nearby".to_string(),
    };
    Ok(ApiResponse::ok(message, ProximityResponse::from(report)))
}

async fn complete(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ExecutionResponse>>> {
    let execution = state.executions.complete(&id, &user.user_id).await?;
    Ok(ApiResponse::ok(
        "Tour completed",
        ExecutionResponse::from(&execution),
    ))
}

async fn abandon(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ExecutionResponse>>> {
    let execution = state.executions.abandon(&id, &user.user_id).await?;
    Ok(ApiResponse::ok(
        "Tour abandoned",
        ExecutionResponse::from(&execution),
    ))
}
