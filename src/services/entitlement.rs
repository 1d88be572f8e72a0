// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Purchase entitlements and entitlement-gated key point access.

use crate::db::{Catalog, TourStore};
use crate::error::{AppError, Result};
use crate::ids;
use crate::models::{KeyPoint, PurchaseToken};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Outcome of [`EntitlementService::grant`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// A new token was issued.
    Issued(PurchaseToken),
    /// The tourist already owned the tour; the existing token is returned.
    AlreadyOwned(PurchaseToken),
}

impl Grant {
    pub fn token(&self) -> &PurchaseToken {
        match self {
            Grant::Issued(t) | Grant::AlreadyOwned(t) => t,
        }
    }

    pub fn into_token(self) -> PurchaseToken {
        match self {
            Grant::Issued(t) | Grant::AlreadyOwned(t) => t,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Grant::Issued(_))
    }
}

/// Key points visible to a viewer.
#[derive(Debug, Clone)]
pub struct KeyPointAccess {
    pub tour_id: String,
    /// All key points when purchased or owned, otherwise the first one only
    pub key_points: Vec<KeyPoint>,
    pub is_purchased: bool,
    pub is_owner: bool,
    pub total_key_points: usize,
}

/// Durable (tourist, tour) -> purchase token mapping.
#[derive(Clone)]
pub struct EntitlementService {
    store: Arc<dyn TourStore>,
    catalog: Arc<dyn Catalog>,
}

impl EntitlementService {
    pub fn new(store: Arc<dyn TourStore>, catalog: Arc<dyn Catalog>) -> Self {
        Self { store, catalog }
    }

    pub async fn is_entitled(&self, tourist_id: &str, tour_id: &str) -> Result<bool> {
        Ok(self.store.get_purchase(tourist_id, tour_id).await?.is_some())
    }

    /// Grant a tour to a tourist. Idempotent: at most one token per pair.
    pub async fn grant(&self, tourist_id: &str, tour_id: &str) -> Result<Grant> {
        if let Some(existing) = self.store.get_purchase(tourist_id, tour_id).await? {
            return Ok(Grant::AlreadyOwned(existing));
        }

        let candidate = self.candidate(tourist_id, tour_id)?;

        // A concurrent grant may have landed between the read and the insert
        let (stored, inserted) = self.store.insert_purchase_if_absent(&candidate).await?;
        if inserted {
            tracing::info!(tourist_id, tour_id, "Purchase token issued");
            Ok(Grant::Issued(stored))
        } else {
            Ok(Grant::AlreadyOwned(stored))
        }
    }

    /// A fresh token for the pair, not yet stored.
    pub(crate) fn candidate(&self, tourist_id: &str, tour_id: &str) -> Result<PurchaseToken> {
        Ok(PurchaseToken {
            tourist_id: tourist_id.to_string(),
            tour_id: tour_id.to_string(),
            token: ids::new_purchase_token()?,
            purchased_at: chrono::Utc::now(),
        })
    }

    /// Tour ids the tourist is entitled to.
    pub async fn list_owned(&self, tourist_id: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .store
            .list_purchases(tourist_id)
            .await?
            .into_iter()
            .map(|t| t.tour_id)
            .collect())
    }

    pub async fn list_purchases(&self, tourist_id: &str) -> Result<Vec<PurchaseToken>> {
        self.store.list_purchases(tourist_id).await
    }

    /// Key points of a tour as seen by `viewer_id`.
    ///
    /// `owner_override` is set by the caller when the viewer is the tour's
    /// guide; ownership implies access.
    pub async fn key_point_access(
        &self,
        viewer_id: &str,
        tour_id: &str,
        owner_override: bool,
    ) -> Result<KeyPointAccess> {
        if self.catalog.get_tour(tour_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Tour {} not found", tour_id)));
        }

        let mut key_points = self.catalog.get_key_points(tour_id).await?;
        key_points.sort_by(KeyPoint::display_cmp);
        let total_key_points = key_points.len();

        let is_purchased = self.is_entitled(viewer_id, tour_id).await?;
        if !is_purchased && !owner_override {
            // Preview: first key point only
            key_points.truncate(1);
        }

        tracing::debug!(
            viewer_id,
            tour_id,
            is_purchased,
            owner_override,
            visible = key_points.len(),
            total_key_points,
            "Key point access evaluated"
        );

        Ok(KeyPointAccess {
            tour_id: tour_id.to_string(),
            key_points,
            is_purchased,
            is_owner: owner_override,
            total_key_points,
        })
    }
}
