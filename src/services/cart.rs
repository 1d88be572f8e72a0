// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cart management and checkout.
//!
//! Every read-modify-write of a tourist's cart runs under that tourist's
//! cart lock and lands through a revision-checked write, so checkout drains
//! one consistent snapshot even with several instances sharing a store.

use crate::db::{Catalog, TourStore};
use crate::error::{AppError, Result};
use crate::models::{CartItem, PurchaseToken, ShoppingCart};
use crate::services::entitlement::EntitlementService;
use crate::services::locks::KeyedLocks;
use crate::services::{write_contention, MAX_WRITE_ATTEMPTS};
use chrono::Utc;
use std::sync::Arc;

/// Result of a checkout.
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    /// Issued or confirmed tokens, one per successfully checked-out item
    pub tokens: Vec<PurchaseToken>,
    /// How many of `tokens` were newly issued
    pub newly_issued: usize,
    /// Items whose tour is no longer purchasable; they stay in the cart
    pub failed_items: Vec<CartItem>,
    /// Cart after checkout
    pub cart: ShoppingCart,
}

impl CheckoutReceipt {
    pub fn is_complete(&self) -> bool {
        self.failed_items.is_empty()
    }
}

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn TourStore>,
    catalog: Arc<dyn Catalog>,
    entitlements: EntitlementService,
    locks: KeyedLocks,
}

impl CartService {
    pub fn new(
        store: Arc<dyn TourStore>,
        catalog: Arc<dyn Catalog>,
        entitlements: EntitlementService,
        locks: KeyedLocks,
    ) -> Self {
        Self {
            store,
            catalog,
            entitlements,
            locks,
        }
    }

    /// Current cart; an empty one if the tourist has none yet.
    pub async fn get_cart(&self, tourist_id: &str) -> Result<ShoppingCart> {
        require_id("tourist_id", tourist_id)?;
        self.load_cart(tourist_id).await
    }

    /// Add a published tour, snapshotting its current name and price.
    ///
    /// Re-adding a tour refreshes the snapshot instead of duplicating it.
    pub async fn add_item(&self, tourist_id: &str, tour_id: &str) -> Result<ShoppingCart> {
        require_id("tourist_id", tourist_id)?;
        require_id("tour_id", tour_id)?;

        let tour = self
            .catalog
            .get_tour(tour_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Tour {} not found", tour_id)))?;

        if !tour.is_purchasable() {
            tracing::debug!(tourist_id, tour_id, "Rejected unpublished tour");
            return Err(AppError::TourNotPurchasable(format!(
                "Tour {} is not published",
                tour_id
            )));
        }

        let _guard = self.locks.acquire(KeyedLocks::cart_key(tourist_id)).await;

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let now = Utc::now();
            let mut cart = self.load_cart(tourist_id).await?;
            cart.upsert_item(CartItem::from_tour(&tour, now));
            cart.updated_at = now;

            let expected = cart.next_revision();
            if self.store.replace_cart(&cart, expected).await? {
                tracing::debug!(
                    tourist_id,
                    tour_id,
                    items = cart.items.len(),
                    total_price_cents = cart.total_price_cents(),
                    "Tour added to cart"
                );
                return Ok(cart);
            }
            tracing::debug!(tourist_id, "Cart changed concurrently, reloading");
        }
        Err(write_contention("Cart"))
    }

    /// Remove a tour from the cart; absent tours are a no-op.
    pub async fn remove_item(&self, tourist_id: &str, tour_id: &str) -> Result<ShoppingCart> {
        require_id("tourist_id", tourist_id)?;
        require_id("tour_id", tour_id)?;

        let _guard = self.locks.acquire(KeyedLocks::cart_key(tourist_id)).await;

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut cart = self.load_cart(tourist_id).await?;
            if !cart.remove_item(tour_id) {
                return Ok(cart);
            }
            cart.updated_at = Utc::now();

            let expected = cart.next_revision();
            if self.store.replace_cart(&cart, expected).await? {
                tracing::debug!(tourist_id, tour_id, "Tour removed from cart");
                return Ok(cart);
            }
            tracing::debug!(tourist_id, "Cart changed concurrently, reloading");
        }
        Err(write_contention("Cart"))
    }

    /// Convert the cart into entitlements.
    ///
    /// Items whose tour is still purchasable are granted and removed; the
    /// others stay in the cart and are reported in `failed_items`. Token
    /// creation and the cart write commit together, and an existing token
    /// always wins, so a retried checkout never issues a second token for
    /// the same tour.
    pub async fn checkout(&self, tourist_id: &str) -> Result<CheckoutReceipt> {
        require_id("tourist_id", tourist_id)?;

        let _guard = self.locks.acquire(KeyedLocks::cart_key(tourist_id)).await;

        for _ in 0..MAX_WRITE_ATTEMPTS {
            let mut cart = self.load_cart(tourist_id).await?;
            if cart.is_empty() {
                return Ok(CheckoutReceipt {
                    tokens: Vec::new(),
                    newly_issued: 0,
                    failed_items: Vec::new(),
                    cart,
                });
            }

            let mut candidates = Vec::with_capacity(cart.items.len());
            let mut failed_items = Vec::new();

            for item in &cart.items {
                let purchasable = self
                    .catalog
                    .get_tour(&item.tour_id)
                    .await?
                    .is_some_and(|t| t.is_purchasable());

                if purchasable {
                    candidates.push(self.entitlements.candidate(tourist_id, &item.tour_id)?);
                } else {
                    tracing::info!(
                        tourist_id,
                        tour_id = %item.tour_id,
                        "Tour no longer purchasable, kept in cart"
                    );
                    failed_items.push(item.clone());
                }
            }

            cart.items = failed_items.clone();
            cart.updated_at = Utc::now();
            let expected = cart.next_revision();

            let Some(grants) = self
                .store
                .commit_checkout(&cart, expected, &candidates)
                .await?
            else {
                tracing::debug!(tourist_id, "Cart changed during checkout, reloading");
                continue;
            };

            let newly_issued = grants.iter().filter(|(_, is_new)| *is_new).count();
            let tokens: Vec<PurchaseToken> = grants.into_iter().map(|(token, _)| token).collect();

            tracing::info!(
                tourist_id,
                purchased = tokens.len(),
                newly_issued,
                failed = failed_items.len(),
                "Checkout finished"
            );

            return Ok(CheckoutReceipt {
                tokens,
                newly_issued,
                failed_items,
                cart,
            });
        }
        Err(write_contention("Cart"))
    }

    async fn load_cart(&self, tourist_id: &str) -> Result<ShoppingCart> {
        Ok(self
            .store
            .get_cart(tourist_id)
            .await?
            .unwrap_or_else(|| ShoppingCart::empty(tourist_id, Utc::now())))
    }
}

pub(crate) fn require_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryCatalog, MemoryStore};
    use crate::models::{Tour, TourStatus};

    fn tour(id: &str, name: &str, price_cents: i64, published: bool) -> Tour {
        Tour {
            id: id.to_string(),
            guide_id: "guide".to_string(),
            name: name.to_string(),
            description: String::new(),
            difficulty: "easy".to_string(),
            tags: vec![],
            price_cents,
            is_published: published,
            status: if published {
                TourStatus::Published
            } else {
                TourStatus::Draft
            },
        }
    }

    fn setup() -> (CartService, Arc<MemoryCatalog>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        catalog.insert_tour(tour("belgrade", "Historic Belgrade", 1000, true));
        catalog.insert_tour(tour("river", "River Walk", 1500, true));
        catalog.insert_tour(tour("draft", "Unfinished", 0, false));

        let entitlements = EntitlementService::new(store.clone(), catalog.clone());
        let service = CartService::new(
            store.clone(),
            catalog.clone(),
            entitlements,
            KeyedLocks::new(),
        );
        (service, catalog, store)
    }

    #[tokio::test]
    async fn test_get_cart_never_missing() {
        let (service, _, _) = setup();
        let cart = service.get_cart("alice").await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.tourist_id, "alice");
    }

    #[tokio::test]
    async fn test_unpublished_tour_rejected() {
        let (service, _, _) = setup();
        let err = service.add_item("alice", "draft").await.unwrap_err();
        assert!(matches!(err, AppError::TourNotPurchasable(_)));
        assert!(service.get_cart("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tour_not_found() {
        let (service, _, _) = setup();
        let err = service.add_item("alice", "nope").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_readd_refreshes_price() {
        let (service, catalog, _) = setup();
        service.add_item("alice", "belgrade").await.unwrap();
        catalog.publish_tour("belgrade", 1250);
        let cart = service.add_item("alice", "belgrade").await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.total_price_cents(), 1250);
    }

    #[tokio::test]
    async fn test_checkout_empty_cart_is_noop() {
        let (service, _, _) = setup();
        let receipt = service.checkout("alice").await.unwrap();
        assert!(receipt.tokens.is_empty());
        assert!(receipt.is_complete());
    }

    #[tokio::test]
    async fn test_partial_checkout_keeps_failed_items() {
        let (service, catalog, _) = setup();
        service.add_item("alice", "belgrade").await.unwrap();
        service.add_item("alice", "river").await.unwrap();
        catalog.unpublish_tour("river");

        let receipt = service.checkout("alice").await.unwrap();

        assert_eq!(receipt.tokens.len(), 1);
        assert_eq!(receipt.tokens[0].tour_id, "belgrade");
        assert_eq!(receipt.failed_items.len(), 1);
        assert_eq!(receipt.failed_items[0].tour_id, "river");

        let cart = service.get_cart("alice").await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert!(cart.contains("river"));
    }

    #[tokio::test]
    async fn test_store_outage_leaves_cart_untouched() {
        let (service, _, store) = setup();
        service.add_item("alice", "belgrade").await.unwrap();

        store.set_offline(true);
        let err = service.checkout("alice").await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        store.set_offline(false);

        let cart = service.get_cart("alice").await.unwrap();
        assert!(cart.contains("belgrade"));
    }

    #[tokio::test]
    async fn test_missing_tourist_id_is_validation_error() {
        let (service, _, _) = setup();
        let err = service.get_cart("  ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
