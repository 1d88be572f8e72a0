// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Last-known simulated position per tourist.

use crate::db::TourStore;
use crate::error::Result;
use crate::models::{Coordinates, Position};
use crate::services::cart::require_id;
use std::sync::Arc;

#[derive(Clone)]
pub struct PositionTracker {
    store: Arc<dyn TourStore>,
}

impl PositionTracker {
    pub fn new(store: Arc<dyn TourStore>) -> Self {
        Self { store }
    }

    /// Overwrite the tourist's position. No plausibility checks: this is a
    /// simulator, any valid coordinate is accepted.
    pub async fn set_position(&self, tourist_id: &str, coords: Coordinates) -> Result<Position> {
        require_id("tourist_id", tourist_id)?;
        let coords = coords.validated()?;

        let position = Position {
            tourist_id: tourist_id.to_string(),
            latitude: coords.latitude,
            longitude: coords.longitude,
            updated_at: chrono::Utc::now(),
        };
        self.store.put_position(&position).await?;

        tracing::debug!(
            tourist_id,
            latitude = coords.latitude,
            longitude = coords.longitude,
            "Position updated"
        );
        Ok(position)
    }

    /// `None` if the tourist never set a position.
    pub async fn get_position(&self, tourist_id: &str) -> Result<Option<Position>> {
        require_id("tourist_id", tourist_id)?;
        self.store.get_position(tourist_id).await
    }
}
