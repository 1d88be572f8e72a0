// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Catalog records: tours and their key points.
//!
//! Authored outside the engine; read-only here.

use geo::Point;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Authoring lifecycle of a tour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TourStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

/// A tour as published by a guide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tour {
    /// Tour ID (also used as document ID)
    pub id: String,
    /// Owning guide's user ID
    pub guide_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Price in cents; only meaningful once published
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub status: TourStatus,
}

impl Tour {
    /// Unpublished tours are not purchasable.
    pub fn is_purchasable(&self) -> bool {
        self.is_published
    }
}

/// A geographic waypoint belonging to a tour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPoint {
    pub id: String,
    pub tour_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    /// Display hint only; not unique, not gapless
    #[serde(default)]
    pub order: i32,
}

impl KeyPoint {
    /// Location as a `geo` point (x = longitude, y = latitude).
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }

    /// Display ordering: `order`, then id.
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.order
            .cmp(&other.order)
            .then_with(|| self.id.cmp(&other.id))
    }
}
