// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Shopping cart model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Tour;

/// A tour in the cart, with name and price frozen at add time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub tour_id: String,
    /// Tour name when added
    pub tour_name: String,
    /// Price in cents when added
    pub price_cents: i64,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    /// Snapshot a tour's current name and price.
    pub fn from_tour(tour: &Tour, now: DateTime<Utc>) -> Self {
        Self {
            tour_id: tour.id.clone(),
            tour_name: tour.name.clone(),
            price_cents: tour.price_cents,
            added_at: now,
        }
    }
}

/// One cart per tourist (document ID = tourist ID).
///
/// Items are unique by `tour_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingCart {
    pub tourist_id: String,
    #[serde(default)]
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every write; 0 for a cart never stored
    #[serde(default)]
    pub revision: u64,
}

impl ShoppingCart {
    pub fn empty(tourist_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            tourist_id: tourist_id.to_string(),
            items: Vec::new(),
            updated_at: now,
            revision: 0,
        }
    }

    /// Advance to the next revision, returning the one the store must still
    /// hold for the write to apply.
    pub fn next_revision(&mut self) -> u64 {
        let expected = self.revision;
        self.revision += 1;
        expected
    }

    /// Insert an item, replacing any existing item for the same tour.
    pub fn upsert_item(&mut self, item: CartItem) {
        match self.items.iter_mut().find(|i| i.tour_id == item.tour_id) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    /// Remove the item for `tour_id`. Returns `false` if it was absent.
    pub fn remove_item(&mut self, tour_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.tour_id != tour_id);
        self.items.len() != before
    }

    pub fn contains(&self, tour_id: &str) -> bool {
        self.items.iter().any(|i| i.tour_id == tour_id)
    }

    pub fn total_price_cents(&self) -> i64 {
        self.items.iter().map(|i| i.price_cents).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
