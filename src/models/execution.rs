// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Tour execution: one tourist's walk through one tour.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Coordinates;

/// `Active -> Completed` and `Active -> Abandoned` are the only transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Active,
    Completed,
    Abandoned,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Active => "active",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Active)
    }
}

/// A key point reached during an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedKeyPoint {
    pub key_point_id: String,
    pub completed_at: DateTime<Utc>,
}

/// Execution record (document ID = `id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TourExecution {
    pub id: String,
    pub tourist_id: String,
    pub tour_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    /// Completion or abandonment time
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    /// Tracker position when the execution was started
    pub start_position: Coordinates,
    /// Unique by `key_point_id`
    #[serde(default)]
    pub completed_key_points: Vec<CompletedKeyPoint>,
    /// Bumped on every write after creation
    #[serde(default)]
    pub revision: u64,
}

impl TourExecution {
    pub fn start(
        id: String,
        tourist_id: &str,
        tour_id: &str,
        start_position: Coordinates,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tourist_id: tourist_id.to_string(),
            tour_id: tour_id.to_string(),
            status: ExecutionStatus::Active,
            started_at: now,
            completed_at: None,
            last_activity_at: now,
            start_position,
            completed_key_points: Vec::new(),
            revision: 0,
        }
    }

    /// See [`ShoppingCart::next_revision`](crate::models::ShoppingCart::next_revision).
    pub fn next_revision(&mut self) -> u64 {
        let expected = self.revision;
        self.revision += 1;
        expected
    }

    pub fn is_active(&self) -> bool {
        self.status == ExecutionStatus::Active
    }

    pub fn belongs_to(&self, tourist_id: &str) -> bool {
        self.tourist_id == tourist_id
    }

    pub fn has_completed(&self, key_point_id: &str) -> bool {
        self.completed_key_points
            .iter()
            .any(|c| c.key_point_id == key_point_id)
    }

    /// Record a reached key point.
    ///
    /// Returns `false` if it was already recorded.
    pub fn mark_key_point(&mut self, key_point_id: &str, now: DateTime<Utc>) -> bool {
        if self.has_completed(key_point_id) {
            return false;
        }
        self.completed_key_points.push(CompletedKeyPoint {
            key_point_id: key_point_id.to_string(),
            completed_at: now,
        });
        self.last_activity_at = now;
        true
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    /// Number of recorded key points that are still part of the tour.
    pub fn completed_among<'a, I>(&self, key_point_ids: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        key_point_ids
            .into_iter()
            .filter(|id| self.has_completed(id))
            .count()
    }

    /// Move to a terminal state. Callers check `is_active` first.
    pub fn finish(&mut self, status: ExecutionStatus, now: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.completed_at = Some(now);
        self.last_activity_at = now;
    }
}
