// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persistence layer.
//!
//! The engine runs against two seams: [`TourStore`] (mutable per-tourist
//! state) and [`Catalog`] (read-only tour data owned by the authoring side).
//! Both are implemented in memory and on Firestore.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::{MemoryCatalog, MemoryStore};

use crate::error::AppError;
use crate::models::{KeyPoint, Position, PurchaseToken, ShoppingCart, Tour, TourExecution};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const TOURS: &str = "tours";
    pub const KEY_POINTS: &str = "keypoints";
    pub const CARTS: &str = "carts";
    /// Keyed by `PurchaseToken::document_id`
    pub const PURCHASE_TOKENS: &str = "purchase_tokens";
    pub const POSITIONS: &str = "positions";
    pub const EXECUTIONS: &str = "executions";
    /// One marker per (tourist, tour) pointing at its active execution
    pub const ACTIVE_EXECUTIONS: &str = "active_executions";
}

/// Outcome of [`TourStore::commit_checkout`] for one token.
pub type CheckoutGrant = (PurchaseToken, bool);

/// Read-side contract of the tour catalog.
#[async_trait]
pub trait Catalog: Send + Sync + 'static {
    async fn get_tour(&self, tour_id: &str) -> Result<Option<Tour>, AppError>;

    /// Key points of a tour, in no particular order.
    async fn get_key_points(&self, tour_id: &str) -> Result<Vec<KeyPoint>, AppError>;
}

/// Keyed store for carts, entitlements, positions and executions.
///
/// Read-modify-write goes through revision-checked writes: a write carries
/// the revision it was computed from and is refused (`false` / `None`) when
/// the stored document moved on. Callers reload and retry. The check and the
/// write are atomic: entry locks in memory, transactions on Firestore.
#[async_trait]
pub trait TourStore: Send + Sync + 'static {
    // ─── Carts ───────────────────────────────────────────────────

    async fn get_cart(&self, tourist_id: &str) -> Result<Option<ShoppingCart>, AppError>;

    /// Write `cart` if the stored revision is still `expected` (0 = absent).
    async fn replace_cart(&self, cart: &ShoppingCart, expected: u64) -> Result<bool, AppError>;

    /// Atomically insert `tokens` (an existing token for the same pair wins)
    /// and write `cart`, guarded by `expected` as in [`Self::replace_cart`].
    ///
    /// Returns `None` when the cart changed, otherwise the stored token for
    /// each input and whether it was newly inserted.
    async fn commit_checkout(
        &self,
        cart: &ShoppingCart,
        expected: u64,
        tokens: &[PurchaseToken],
    ) -> Result<Option<Vec<CheckoutGrant>>, AppError>;

    // ─── Purchase Tokens ─────────────────────────────────────────

    async fn get_purchase(
        &self,
        tourist_id: &str,
        tour_id: &str,
    ) -> Result<Option<PurchaseToken>, AppError>;

    /// Insert `token` unless one exists for its (tourist, tour) pair.
    ///
    /// Returns the stored token and whether it was newly inserted.
    async fn insert_purchase_if_absent(
        &self,
        token: &PurchaseToken,
    ) -> Result<(PurchaseToken, bool), AppError>;

    async fn list_purchases(&self, tourist_id: &str) -> Result<Vec<PurchaseToken>, AppError>;

    // ─── Positions ───────────────────────────────────────────────

    async fn get_position(&self, tourist_id: &str) -> Result<Option<Position>, AppError>;

    async fn put_position(&self, position: &Position) -> Result<(), AppError>;

    // ─── Executions ──────────────────────────────────────────────

    async fn get_execution(&self, execution_id: &str) -> Result<Option<TourExecution>, AppError>;

    async fn find_active_execution(
        &self,
        tourist_id: &str,
        tour_id: &str,
    ) -> Result<Option<TourExecution>, AppError>;

    async fn list_executions(&self, tourist_id: &str) -> Result<Vec<TourExecution>, AppError>;

    /// Store `execution` as the active one for its (tourist, tour) pair,
    /// unless another active execution exists.
    ///
    /// Returns the active execution and whether it is the one passed in.
    async fn create_active_execution(
        &self,
        execution: &TourExecution,
    ) -> Result<(TourExecution, bool), AppError>;

    /// Write `execution` if its stored revision is still `expected`.
    ///
    /// A terminal execution releases its pair's active slot in the same write.
    async fn replace_execution(
        &self,
        execution: &TourExecution,
        expected: u64,
    ) -> Result<bool, AppError>;
}
