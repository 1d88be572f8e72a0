// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Tour Engine: commerce and execution backend for guided walking tours
//!
//! Tourists buy published tours through a cart, which grants durable
//! entitlements. A purchased tour can then be executed: the tourist's
//! simulated position is polled against the tour's key points, and each
//! key point within 50 meters is marked as reached.

pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::{Catalog, TourStore};
use services::{CartService, EntitlementService, ExecutionEngine, KeyedLocks, PositionTracker};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub catalog: Arc<dyn Catalog>,
    pub entitlements: EntitlementService,
    pub carts: CartService,
    pub positions: PositionTracker,
    pub executions: ExecutionEngine,
}

impl AppState {
    /// Wire up all services over one store and one catalog.
    ///
    /// Every service shares the same lock registry, so cart and execution
    /// locks are process-wide.
    pub fn new(config: Config, store: Arc<dyn TourStore>, catalog: Arc<dyn Catalog>) -> Self {
        let locks = KeyedLocks::new();
        let entitlements = EntitlementService::new(store.clone(), catalog.clone());
        let positions = PositionTracker::new(store.clone());
        let carts = CartService::new(
            store.clone(),
            catalog.clone(),
            entitlements.clone(),
            locks.clone(),
        );
        let executions = ExecutionEngine::new(
            store,
            catalog.clone(),
            entitlements.clone(),
            positions.clone(),
            locks,
        );

        Self {
            config,
            catalog,
            entitlements,
            carts,
            positions,
            executions,
        }
    }
}
