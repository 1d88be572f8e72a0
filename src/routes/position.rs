// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Position simulator routes.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{Coordinates, Position};
use crate::routes::{ApiJson, ApiResponse};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{extract::State, routing::get, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/position", get(get_position).put(set_position))
}

#[derive(Serialize, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PositionResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at: String,
}

impl From<&Position> for PositionResponse {
    fn from(position: &Position) -> Self {
        Self {
            latitude: position.latitude,
            longitude: position.longitude,
            updated_at: format_utc_rfc3339(position.updated_at),
        }
    }
}

/// Latitude/longitude body shared by position updates and proximity polls.
#[derive(Deserialize, Debug, Clone, Copy)]
pub struct CoordinatesRequest {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<CoordinatesRequest> for Coordinates {
    fn from(req: CoordinatesRequest) -> Self {
        Coordinates::new(req.latitude, req.longitude)
    }
}

async fn set_position(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ApiJson(body): ApiJson<CoordinatesRequest>,
) -> Result<Json<ApiResponse<PositionResponse>>> {
    let position = state
        .positions
        .set_position(&user.user_id, body.into())
        .await?;
    Ok(ApiResponse::ok(
        "Position updated",
        PositionResponse::from(&position),
    ))
}

/// `data` is `null` when no position has been set.
async fn get_position(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Option<PositionResponse>>>> {
    let position = state.positions.get_position(&user.user_id).await?;
    let message = if position.is_some() {
        "Position loaded"
    } else {
        "No position set"
    };
    Ok(ApiResponse::ok(
        message,
        position.as_ref().map(PositionResponse::from),
    ))
}
