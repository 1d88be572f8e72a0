// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod cart;
pub mod execution;
pub mod position;
pub mod purchase;
pub mod tour;

pub use cart::{CartItem, ShoppingCart};
pub use execution::{CompletedKeyPoint, ExecutionStatus, TourExecution};
pub use position::{Coordinates, Position};
pub use purchase::{pair_document_id, PurchaseToken};
pub use tour::{KeyPoint, Tour, TourStatus};
