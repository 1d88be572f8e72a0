// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-tour routes: key point access and execution start.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::KeyPoint;
use crate::routes::executions::ExecutionResponse;
use crate::routes::ApiResponse;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tours/{tour_id}/keypoints", get(get_key_points))
        .route("/api/tours/{tour_id}/executions", post(start_execution))
}

#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct KeyPointDto {
    pub id: String,
    pub name: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub image: Option<String>,
    pub order: i32,
}

impl From<&KeyPoint> for KeyPointDto {
    fn from(kp: &KeyPoint) -> Self {
        Self {
            id: kp.id.clone(),
            name: kp.name.clone(),
            description: kp.description.clone(),
            latitude: kp.latitude,
            longitude: kp.longitude,
            image: kp.image.clone(),
            order: kp.order,
        }
    }
}

#[derive(Serialize, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct KeyPointsResponse {
    pub tour_id: String,
    pub key_points: Vec<KeyPointDto>,
    pub is_purchased: bool,
    pub is_owner: bool,
    pub total_key_points: usize,
}

#[derive(Serialize, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct StartExecutionResponse {
    pub execution: ExecutionResponse,
    /// An existing active execution was continued
    pub resumed: bool,
}

/// Key points of a tour. Viewers who neither bought nor authored the tour
/// only see the first key point.
async fn get_key_points(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(tour_id): Path<String>,
) -> Result<Json<ApiResponse<KeyPointsResponse>>> {
    let tour = state
        .catalog
        .get_tour(&tour_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tour {} not found", tour_id)))?;
    let is_owner = tour.guide_id == user.user_id;

    let access = state
        .entitlements
        .key_point_access(&user.user_id, &tour_id, is_owner)
        .await?;

    let message = if access.is_purchased || access.is_owner {
        "Key points loaded"
    } else {
        "Preview only. Purchase the tour to see all key points."
    };

    Ok(ApiResponse::ok(
        message,
        KeyPointsResponse {
            tour_id: access.tour_id,
            key_points: access.key_points.iter().map(KeyPointDto::from).collect(),
            is_purchased: access.is_purchased,
            is_owner: access.is_owner,
            total_key_points: access.total_key_points,
        },
    ))
}

async fn start_execution(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(tour_id): Path<String>,
) -> Result<Json<ApiResponse<StartExecutionResponse>>> {
    let outcome = state.executions.start(&user.user_id, &tour_id).await?;

    let message = if outcome.resumed {
        "Continuing active tour"
    } else {
        "Tour started"
    };

    Ok(ApiResponse::ok(
        message,
        StartExecutionResponse {
            execution: ExecutionResponse::from(&outcome.execution),
            resumed: outcome.resumed,
        },
    ))
}
