// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Purchase entitlement record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable proof that a tourist may access a tour.
///
/// At most one per (tourist, tour); see [`PurchaseToken::document_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseToken {
    pub tourist_id: String,
    pub tour_id: String,
    /// Opaque token string
    pub token: String,
    pub purchased_at: DateTime<Utc>,
}

impl PurchaseToken {
    /// Composite key for a (tourist, tour) pair.
    pub fn document_id(tourist_id: &str, tour_id: &str) -> String {
        pair_document_id(tourist_id, tour_id)
    }
}

/// `{tourist}:{tour}` with both parts percent-encoded.
///
/// Shared by every collection keyed by a (tourist, tour) pair.
pub fn pair_document_id(tourist_id: &str, tour_id: &str) -> String {
    format!(
        "{}:{}",
        urlencoding::encode(tourist_id),
        urlencoding::encode(tour_id)
    )
}
