// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tour execution engine.
//!
//! Starting, proximity-driven key point completion, and the two terminal
//! transitions. Mutations of an execution run under its lock and land
//! through revision-checked writes; starts converge on the store's single
//! active slot per (tourist, tour).

use crate::db::{Catalog, TourStore};
use crate::error::{AppError, Result};
use crate::ids;
use crate::models::{Coordinates, ExecutionStatus, KeyPoint, TourExecution};
use crate::services::cart::require_id;
use crate::services::entitlement::EntitlementService;
use crate::services::geo::{nearest_within, PROXIMITY_THRESHOLD_METERS};
use crate::services::locks::KeyedLocks;
use crate::services::position::PositionTracker;
use crate::services::{write_contention, MAX_WRITE_ATTEMPTS};
use chrono::Utc;
use std::sync::Arc;

/// Result of [`ExecutionEngine::start`].
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub execution: TourExecution,
    /// `true` when an existing active execution was returned
    pub resumed: bool,
}

/// Result of a proximity poll.
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityReport {
    pub near_key_point: bool,
    /// The key point completed by this poll
    pub nearby_key_point: Option<KeyPoint>,
    pub distance_meters: Option<f64>,
    pub completed_count: usize,
    pub total_count: usize,
}

impl ProximityReport {
    fn idle(completed_count: usize, total_count: usize) -> Self {
        Self {
            near_key_point: false,
            nearby_key_point: None,
            distance_meters: None,
            completed_count,
            total_count,
        }
    }
}

#[derive(Clone)]
pub struct ExecutionEngine {
    store: Arc<dyn TourStore>,
    catalog: Arc<dyn Catalog>,
    entitlements: EntitlementService,
    positions: PositionTracker,
    locks: KeyedLocks,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<dyn TourStore>,
        catalog: Arc<dyn Catalog>,
        entitlements: EntitlementService,
        positions: PositionTracker,
        locks: KeyedLocks,
    ) -> Self {
        Self {
            store,
            catalog,
            entitlements,
            positions,
            locks,
        }
    }

    /// Start (or resume) the tourist's execution of a purchased tour.
    ///
    /// Requires an entitlement and a current position. If an active
    /// execution already exists for the pair it is returned unchanged.
    pub async fn start(&self, tourist_id: &str, tour_id: &str) -> Result<StartOutcome> {
        require_id("tourist_id", tourist_id)?;
        require_id("tour_id", tour_id)?;

        if !self.entitlements.is_entitled(tourist_id, tour_id).await? {
            tracing::debug!(tourist_id, tour_id, "Start refused: not entitled");
            return Err(AppError::NotEntitled(tour_id.to_string()));
        }

        let position = self
            .positions
            .get_position(tourist_id)
            .await?
            .ok_or(AppError::NoPosition)?;

        let _guard = self
            .locks
            .acquire(KeyedLocks::tour_key(tourist_id, tour_id))
            .await;

        if let Some(existing) = self.store.find_active_execution(tourist_id, tour_id).await? {
            tracing::debug!(
                tourist_id,
                tour_id,
                execution_id = %existing.id,
                "Resuming active execution"
            );
            return Ok(StartOutcome {
                execution: existing,
                resumed: true,
            });
        }

        let candidate = TourExecution::start(
            ids::new_execution_id()?,
            tourist_id,
            tour_id,
            position.coordinates(),
            Utc::now(),
        );
        let (execution, created) = self.store.create_active_execution(&candidate).await?;

        if created {
            tracing::info!(
                tourist_id,
                tour_id,
                execution_id = %execution.id,
                "Execution started"
            );
        } else {
            tracing::debug!(
                tourist_id,
                tour_id,
                execution_id = %execution.id,
                "Lost start race, resuming active execution"
            );
        }

        Ok(StartOutcome {
            execution,
            resumed: !created,
        })
    }

    /// Complete the nearest uncompleted key point within range, if any.
    ///
    /// Polls on executions that are not active, or not owned by the caller,
    /// report `near_key_point = false` and change nothing.
    pub async fn check_proximity(
        &self,
        execution_id: &str,
        tourist_id: &str,
        coords: Coordinates,
    ) -> Result<ProximityReport> {
        require_id("execution_id", execution_id)?;
        let coords = coords.validated()?;

        let _guard = self
            .locks
            .acquire(KeyedLocks::execution_key(execution_id))
            .await;

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut execution = self.load(execution_id).await?;
            if !execution.belongs_to(tourist_id) {
                return Ok(ProximityReport::idle(0, 0));
            }

            let key_points = self.catalog.get_key_points(&execution.tour_id).await?;
            let total_count = key_points.len();
            let key_point_ids = || key_points.iter().map(|kp| kp.id.as_str());

            if !execution.is_active() {
                return Ok(ProximityReport::idle(
                    execution.completed_among(key_point_ids()),
                    total_count,
                ));
            }

            let remaining = key_points
                .iter()
                .filter(|kp| !execution.has_completed(&kp.id));
            let reached = nearest_within(coords.point(), remaining, PROXIMITY_THRESHOLD_METERS)
                .map(|(key_point, distance)| (key_point.clone(), distance));

            let now = Utc::now();
            let expected = execution.next_revision();
            match &reached {
                Some((key_point, _)) => {
                    execution.mark_key_point(&key_point.id, now);
                }
                None => execution.touch(now),
            }

            if !self.store.replace_execution(&execution, expected).await? {
                tracing::debug!(execution_id, "Execution changed concurrently, reloading");
                continue;
            }

            let completed_count = execution.completed_among(key_point_ids());
            let report = match reached {
                Some((key_point, distance)) => {
                    tracing::info!(
                        execution_id,
                        tourist_id,
                        key_point_id = %key_point.id,
                        distance_meters = distance,
                        "Key point reached"
                    );
                    ProximityReport {
                        near_key_point: true,
                        nearby_key_point: Some(key_point),
                        distance_meters: Some(distance),
                        completed_count,
                        total_count,
                    }
                }
                None => ProximityReport::idle(completed_count, total_count),
            };
            return Ok(report);
        }
        Err(write_contention("Execution"))
    }

    /// Finish an execution once every current key point is reached.
    pub async fn complete(&self, execution_id: &str, tourist_id: &str) -> Result<TourExecution> {
        require_id("execution_id", execution_id)?;

        let _guard = self
            .locks
            .acquire(KeyedLocks::execution_key(execution_id))
            .await;

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut execution = self.load_owned(execution_id, tourist_id).await?;
            ensure_active(&execution)?;

            let key_points = self.catalog.get_key_points(&execution.tour_id).await?;
            let total = key_points.len();
            let completed =
                execution.completed_among(key_points.iter().map(|kp| kp.id.as_str()));
            if completed < total {
                return Err(AppError::IncompleteTour { completed, total });
            }

            let expected = execution.next_revision();
            execution.finish(ExecutionStatus::Completed, Utc::now());
            if self.store.replace_execution(&execution, expected).await? {
                tracing::info!(execution_id, tourist_id, total, "Execution completed");
                return Ok(execution);
            }
        }
        Err(write_contention("Execution"))
    }

    /// Abandon an active execution regardless of progress.
    pub async fn abandon(&self, execution_id: &str, tourist_id: &str) -> Result<TourExecution> {
        require_id("execution_id", execution_id)?;

        let _guard = self
            .locks
            .acquire(KeyedLocks::execution_key(execution_id))
            .await;

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut execution = self.load_owned(execution_id, tourist_id).await?;
            ensure_active(&execution)?;

            let expected = execution.next_revision();
            execution.finish(ExecutionStatus::Abandoned, Utc::now());
            if self.store.replace_execution(&execution, expected).await? {
                tracing::info!(execution_id, tourist_id, "Execution abandoned");
                return Ok(execution);
            }
        }
        Err(write_contention("Execution"))
    }

    pub async fn get_execution(
        &self,
        execution_id: &str,
        tourist_id: &str,
    ) -> Result<TourExecution> {
        require_id("execution_id", execution_id)?;
        self.load_owned(execution_id, tourist_id).await
    }

    /// Executions of a tourist, newest first.
    pub async fn list_executions(
        &self,
        tourist_id: &str,
        active_only: bool,
    ) -> Result<Vec<TourExecution>> {
        require_id("tourist_id", tourist_id)?;
        let mut executions = self.store.list_executions(tourist_id).await?;
        if active_only {
            executions.retain(TourExecution::is_active);
        }
        Ok(executions)
    }

    async fn load(&self, execution_id: &str) -> Result<TourExecution> {
        self.store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Execution {} not found", execution_id)))
    }

    /// Someone else's execution is reported as missing.
    async fn load_owned(&self, execution_id: &str, tourist_id: &str) -> Result<TourExecution> {
        let execution = self.load(execution_id).await?;
        if !execution.belongs_to(tourist_id) {
            return Err(AppError::NotFound(format!(
                "Execution {} not found",
                execution_id
            )));
        }
        Ok(execution)
    }
}

fn ensure_active(execution: &TourExecution) -> Result<()> {
    if execution.is_active() {
        Ok(())
    } else {
        Err(AppError::InvalidState(format!(
            "Execution {} is already {}",
            execution.id,
            execution.status.as_str()
        )))
    }
}
