// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod cart;
pub mod entitlement;
pub mod execution;
pub mod geo;
pub mod locks;
pub mod position;

pub use cart::{CartService, CheckoutReceipt};
pub use entitlement::{EntitlementService, Grant, KeyPointAccess};
pub use execution::{ExecutionEngine, ProximityReport, StartOutcome};
pub use locks::KeyedLocks;
pub use position::PositionTracker;

use crate::error::AppError;

/// Reload-and-retry budget for revision-checked writes.
pub(crate) const MAX_WRITE_ATTEMPTS: usize = 5;

pub(crate) fn write_contention(what: &str) -> AppError {
    AppError::Database(format!("{} kept changing during the update", what))
}
