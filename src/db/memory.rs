// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory backend for development and tests.

use crate::db::{Catalog, CheckoutGrant, TourStore};
use crate::error::AppError;
use crate::models::{
    pair_document_id, KeyPoint, Position, PurchaseToken, ShoppingCart, Tour, TourExecution,
    TourStatus,
};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use geojson::GeoJson;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// `dashmap`-backed [`TourStore`].
///
/// Lock order when two maps are held at once: `active`, then `executions`,
/// then `by_tourist`; `carts`, then `purchases`.
#[derive(Default)]
pub struct MemoryStore {
    carts: DashMap<String, ShoppingCart>,
    purchases: DashMap<String, PurchaseToken>,
    positions: DashMap<String, Position>,
    executions: DashMap<String, TourExecution>,
    /// Pair document id -> id of its active execution
    active: DashMap<String, String>,
    /// Tourist id -> ids of all their executions
    by_tourist: DashMap<String, Vec<String>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unavailable store: every call fails while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), AppError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Database(
                "Store unavailable (offline mode)".to_string(),
            ));
        }
        Ok(())
    }

    fn insert_new_execution(&self, execution: &TourExecution) {
        self.executions
            .insert(execution.id.clone(), execution.clone());
        self.by_tourist
            .entry(execution.tourist_id.clone())
            .or_default()
            .push(execution.id.clone());
    }
}

#[async_trait]
impl TourStore for MemoryStore {
    async fn get_cart(&self, tourist_id: &str) -> Result<Option<ShoppingCart>, AppError> {
        self.check_online()?;
        Ok(self.carts.get(tourist_id).map(|c| c.clone()))
    }

    async fn replace_cart(&self, cart: &ShoppingCart, expected: u64) -> Result<bool, AppError> {
        self.check_online()?;
        let slot = self.carts.entry(cart.tourist_id.clone());
        let current = match &slot {
            Entry::Occupied(stored) => stored.get().revision,
            Entry::Vacant(_) => 0,
        };
        if current != expected {
            return Ok(false);
        }
        slot.insert(cart.clone());
        Ok(true)
    }

    async fn commit_checkout(
        &self,
        cart: &ShoppingCart,
        expected: u64,
        tokens: &[PurchaseToken],
    ) -> Result<Option<Vec<CheckoutGrant>>, AppError> {
        self.check_online()?;

        // The cart entry stays locked until tokens and cart are both written
        let slot = self.carts.entry(cart.tourist_id.clone());
        let current = match &slot {
            Entry::Occupied(stored) => stored.get().revision,
            Entry::Vacant(_) => 0,
        };
        if current != expected {
            return Ok(None);
        }

        let grants: Vec<CheckoutGrant> = tokens
            .iter()
            .map(|token| {
                let key = PurchaseToken::document_id(&token.tourist_id, &token.tour_id);
                match self.purchases.entry(key) {
                    Entry::Occupied(existing) => (existing.get().clone(), false),
                    Entry::Vacant(vacant) => {
                        vacant.insert(token.clone());
                        (token.clone(), true)
                    }
                }
            })
            .collect();

        slot.insert(cart.clone());
        Ok(Some(grants))
    }

    async fn get_purchase(
        &self,
        tourist_id: &str,
        tour_id: &str,
    ) -> Result<Option<PurchaseToken>, AppError> {
        self.check_online()?;
        let key = PurchaseToken::document_id(tourist_id, tour_id);
        Ok(self.purchases.get(&key).map(|t| t.clone()))
    }

    async fn insert_purchase_if_absent(
        &self,
        token: &PurchaseToken,
    ) -> Result<(PurchaseToken, bool), AppError> {
        self.check_online()?;
        let key = PurchaseToken::document_id(&token.tourist_id, &token.tour_id);
        match self.purchases.entry(key) {
            Entry::Occupied(existing) => Ok((existing.get().clone(), false)),
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
                Ok((token.clone(), true))
            }
        }
    }

    async fn list_purchases(&self, tourist_id: &str) -> Result<Vec<PurchaseToken>, AppError> {
        self.check_online()?;
        let mut tokens: Vec<PurchaseToken> = self
            .purchases
            .iter()
            .filter(|t| t.tourist_id == tourist_id)
            .map(|t| t.clone())
            .collect();
        tokens.sort_by(|a, b| a.purchased_at.cmp(&b.purchased_at));
        Ok(tokens)
    }

    async fn get_position(&self, tourist_id: &str) -> Result<Option<Position>, AppError> {
        self.check_online()?;
        Ok(self.positions.get(tourist_id).map(|p| p.clone()))
    }

    async fn put_position(&self, position: &Position) -> Result<(), AppError> {
        self.check_online()?;
        self.positions
            .insert(position.tourist_id.clone(), position.clone());
        Ok(())
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<TourExecution>, AppError> {
        self.check_online()?;
        Ok(self.executions.get(execution_id).map(|e| e.clone()))
    }

    async fn find_active_execution(
        &self,
        tourist_id: &str,
        tour_id: &str,
    ) -> Result<Option<TourExecution>, AppError> {
        self.check_online()?;
        let Some(execution_id) = self
            .active
            .get(&pair_document_id(tourist_id, tour_id))
            .map(|id| id.clone())
        else {
            return Ok(None);
        };
        Ok(self
            .executions
            .get(&execution_id)
            .map(|e| e.clone())
            .filter(TourExecution::is_active))
    }

    async fn list_executions(&self, tourist_id: &str) -> Result<Vec<TourExecution>, AppError> {
        self.check_online()?;
        let ids = self
            .by_tourist
            .get(tourist_id)
            .map(|ids| ids.clone())
            .unwrap_or_default();
        let mut executions: Vec<TourExecution> = ids
            .iter()
            .filter_map(|id| self.executions.get(id).map(|e| e.clone()))
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(executions)
    }

    async fn create_active_execution(
        &self,
        execution: &TourExecution,
    ) -> Result<(TourExecution, bool), AppError> {
        self.check_online()?;
        let key = pair_document_id(&execution.tourist_id, &execution.tour_id);
        match self.active.entry(key) {
            Entry::Occupied(mut slot) => {
                let current = self
                    .executions
                    .get(slot.get())
                    .map(|e| e.clone())
                    .filter(TourExecution::is_active);
                if let Some(current) = current {
                    return Ok((current, false));
                }
                // Stale slot left by a finished execution
                slot.insert(execution.id.clone());
                self.insert_new_execution(execution);
            }
            Entry::Vacant(slot) => {
                slot.insert(execution.id.clone());
                self.insert_new_execution(execution);
            }
        }
        Ok((execution.clone(), true))
    }

    async fn replace_execution(
        &self,
        execution: &TourExecution,
        expected: u64,
    ) -> Result<bool, AppError> {
        self.check_online()?;
        {
            let Some(mut stored) = self.executions.get_mut(&execution.id) else {
                return Ok(false);
            };
            if stored.revision != expected {
                return Ok(false);
            }
            *stored = execution.clone();
        }

        if execution.status.is_terminal() {
            let key = pair_document_id(&execution.tourist_id, &execution.tour_id);
            self.active.remove_if(&key, |_, id| *id == execution.id);
        }
        Ok(true)
    }
}

// ─── Catalog ─────────────────────────────────────────────────────

/// In-memory [`Catalog`], seeded programmatically or from GeoJSON.
#[derive(Default)]
pub struct MemoryCatalog {
    tours: DashMap<String, Tour>,
    key_points: DashMap<String, Vec<KeyPoint>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_tour(&self, tour: Tour) {
        self.tours.insert(tour.id.clone(), tour);
    }

    /// Add or replace a key point (matched by id within its tour).
    pub fn insert_key_point(&self, key_point: KeyPoint) {
        let mut points = self.key_points.entry(key_point.tour_id.clone()).or_default();
        points.retain(|p| p.id != key_point.id);
        points.push(key_point);
    }

    /// Publish a tour at a price. Returns `false` if the tour is unknown.
    pub fn publish_tour(&self, tour_id: &str, price_cents: i64) -> bool {
        match self.tours.get_mut(tour_id) {
            Some(mut tour) => {
                tour.is_published = true;
                tour.status = TourStatus::Published;
                tour.price_cents = price_cents;
                true
            }
            None => false,
        }
    }

    /// Take a tour off sale.
    pub fn unpublish_tour(&self, tour_id: &str) -> bool {
        match self.tours.get_mut(tour_id) {
            Some(mut tour) => {
                tour.is_published = false;
                tour.status = TourStatus::Archived;
                true
            }
            None => false,
        }
    }

    pub fn tour_count(&self) -> usize {
        self.tours.len()
    }

    /// Load a catalog from a GeoJSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let json_data =
            fs::read_to_string(path.as_ref()).map_err(|e| CatalogError::IoError(e.to_string()))?;
        Self::load_from_json(&json_data)
    }

    /// Load a catalog from a GeoJSON FeatureCollection.
    ///
    /// Features with `kind = "tour"` carry tour metadata in their properties;
    /// features with `kind = "key_point"` must have Point geometry.
    pub fn load_from_json(json_data: &str) -> Result<Self, CatalogError> {
        let geojson: GeoJson = json_data
            .parse()
            .map_err(|e: geojson::Error| CatalogError::ParseError(e.to_string()))?;

        let GeoJson::FeatureCollection(collection) = geojson else {
            return Err(CatalogError::ParseError(
                "expected a FeatureCollection".to_string(),
            ));
        };

        let catalog = Self::new();
        for feature in collection.features {
            let kind = feature
                .property("kind")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let properties = serde_json::Value::Object(feature.properties.clone().unwrap_or_default());

            match kind.as_str() {
                "tour" => {
                    let tour: Tour = serde_json::from_value(properties)
                        .map_err(|e| CatalogError::ParseError(e.to_string()))?;
                    catalog.insert_tour(tour);
                }
                "key_point" => {
                    let (longitude, latitude) = match feature.geometry.map(|g| g.value) {
                        Some(geojson::Value::Point(coords)) if coords.len() >= 2 => {
                            (coords[0], coords[1])
                        }
                        _ => return Err(CatalogError::UnsupportedGeometry),
                    };
                    let mut properties = properties;
                    if let Some(map) = properties.as_object_mut() {
                        map.insert("latitude".to_string(), latitude.into());
                        map.insert("longitude".to_string(), longitude.into());
                    }
                    let key_point: KeyPoint = serde_json::from_value(properties)
                        .map_err(|e| CatalogError::ParseError(e.to_string()))?;
                    catalog.insert_key_point(key_point);
                }
                other => {
                    tracing::warn!(kind = other, "Skipping catalog feature of unknown kind");
                }
            }
        }

        tracing::info!(
            tours = catalog.tours.len(),
            key_points = catalog.key_points.iter().map(|p| p.len()).sum::<usize>(),
            "Loaded catalog"
        );
        Ok(catalog)
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn get_tour(&self, tour_id: &str) -> Result<Option<Tour>, AppError> {
        Ok(self.tours.get(tour_id).map(|t| t.clone()))
    }

    async fn get_key_points(&self, tour_id: &str) -> Result<Vec<KeyPoint>, AppError> {
        Ok(self
            .key_points
            .get(tour_id)
            .map(|p| p.clone())
            .unwrap_or_default())
    }
}

/// Errors from catalog loading.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Failed to parse catalog GeoJSON: {0}")]
    ParseError(String),

    #[error("Unsupported geometry type (expected Point for key points)")]
    UnsupportedGeometry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn token(tourist: &str, tour: &str, value: &str) -> PurchaseToken {
        PurchaseToken {
            tourist_id: tourist.to_string(),
            tour_id: tour.to_string(),
            token: value.to_string(),
            purchased_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_purchase_keeps_first_token() {
        let store = MemoryStore::new();

        let (first, inserted) = store
            .insert_purchase_if_absent(&token("alice", "t1", "first"))
            .await
            .unwrap();
        assert!(inserted);

        let (second, inserted) = store
            .insert_purchase_if_absent(&token("alice", "t1", "second"))
            .await
            .unwrap();
        assert!(!inserted);
        assert_eq!(first.token, second.token);
        assert_eq!(store.list_purchases("alice").await.unwrap().len(), 1);
    }

    fn execution(id: &str, tourist: &str, tour: &str) -> TourExecution {
        TourExecution::start(
            id.to_string(),
            tourist,
            tour,
            crate::models::Coordinates::new(44.8176, 20.4569),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_replace_cart_refuses_stale_revision() {
        let store = MemoryStore::new();
        let mut cart = ShoppingCart::empty("alice", Utc::now());

        let expected = cart.next_revision();
        assert!(store.replace_cart(&cart, expected).await.unwrap());

        // Computed from the never-stored cart, so revision 0 is stale now
        let mut stale = ShoppingCart::empty("alice", Utc::now());
        let expected = stale.next_revision();
        assert!(!store.replace_cart(&stale, expected).await.unwrap());

        let expected = cart.next_revision();
        assert!(store.replace_cart(&cart, expected).await.unwrap());
        assert_eq!(store.get_cart("alice").await.unwrap().unwrap().revision, 2);
    }

    #[tokio::test]
    async fn test_commit_checkout_is_all_or_nothing() {
        let store = MemoryStore::new();
        store
            .insert_purchase_if_absent(&token("alice", "t1", "owned"))
            .await
            .unwrap();

        let mut cart = ShoppingCart::empty("alice", Utc::now());
        let expected = cart.next_revision();
        store.replace_cart(&cart, expected).await.unwrap();

        let tokens = [token("alice", "t1", "fresh1"), token("alice", "t2", "fresh2")];

        // Stale revision: nothing is written
        let mut stale = cart.clone();
        stale.revision = 7;
        assert!(store
            .commit_checkout(&stale, 6, &tokens)
            .await
            .unwrap()
            .is_none());
        assert!(store.get_purchase("alice", "t2").await.unwrap().is_none());

        let expected = cart.next_revision();
        let grants = store
            .commit_checkout(&cart, expected, &tokens)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(grants[0].0.token, "owned");
        assert!(!grants[0].1);
        assert_eq!(grants[1].0.token, "fresh2");
        assert!(grants[1].1);
        assert_eq!(store.get_cart("alice").await.unwrap().unwrap().revision, 2);
    }

    #[tokio::test]
    async fn test_one_active_execution_per_pair() {
        let store = MemoryStore::new();

        let (first, created) = store
            .create_active_execution(&execution("e1", "alice", "t1"))
            .await
            .unwrap();
        assert!(created);

        let (second, created) = store
            .create_active_execution(&execution("e2", "alice", "t1"))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);

        // Finishing releases the slot
        let mut finished = first.clone();
        let expected = finished.next_revision();
        finished.finish(crate::models::ExecutionStatus::Abandoned, Utc::now());
        assert!(store.replace_execution(&finished, expected).await.unwrap());
        assert!(store
            .find_active_execution("alice", "t1")
            .await
            .unwrap()
            .is_none());

        let (third, created) = store
            .create_active_execution(&execution("e3", "alice", "t1"))
            .await
            .unwrap();
        assert!(created);
        assert_eq!(third.id, "e3");
    }

    #[tokio::test]
    async fn test_replace_execution_refuses_stale_revision() {
        let store = MemoryStore::new();
        let (mut exec, _) = store
            .create_active_execution(&execution("e1", "alice", "t1"))
            .await
            .unwrap();
        let mut concurrent = exec.clone();

        let expected = exec.next_revision();
        exec.mark_key_point("kp1", Utc::now());
        assert!(store.replace_execution(&exec, expected).await.unwrap());

        let expected = concurrent.next_revision();
        concurrent.mark_key_point("kp2", Utc::now());
        assert!(!store.replace_execution(&concurrent, expected).await.unwrap());

        let stored = store.get_execution("e1").await.unwrap().unwrap();
        assert!(stored.has_completed("kp1"));
        assert!(!stored.has_completed("kp2"));

        assert!(!store
            .replace_execution(&execution("missing", "alice", "t1"), 0)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_executions_indexed_by_tourist() {
        let store = MemoryStore::new();
        let runs = [("e1", "alice", "t1"), ("e2", "bob", "t1"), ("e3", "alice", "t2")];
        for (id, tourist, tour) in runs {
            store
                .create_active_execution(&execution(id, tourist, tour))
                .await
                .unwrap();
        }

        let alice: Vec<String> = store
            .list_executions("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(alice.len(), 2);
        assert!(alice.contains(&"e1".to_string()));
        assert!(alice.contains(&"e3".to_string()));
        assert!(store.list_executions("carol").await.unwrap().is_empty());

        let active = store.find_active_execution("bob", "t1").await.unwrap();
        assert_eq!(active.unwrap().id, "e2");
        assert!(store
            .find_active_execution("bob", "t2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_offline_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_offline(true);

        let err = store.get_cart("alice").await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        store.set_offline(false);
        assert!(store.get_cart("alice").await.unwrap().is_none());
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "geometry": null,
                    "properties": {
                        "kind": "tour", "id": "t1", "guide_id": "g1",
                        "name": "Historic Belgrade", "price_cents": 1000,
                        "is_published": true, "status": "published"
                    }
                },
                {
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": [20.4569, 44.8180] },
                    "properties": {
                        "kind": "key_point", "id": "kp1", "tour_id": "t1",
                        "name": "Knez Mihailova", "order": 1
                    }
                }
            ]
        }"#;

        let catalog = MemoryCatalog::load_from_json(json).unwrap();
        let tour = catalog.tours.get("t1").unwrap().clone();
        assert!(tour.is_purchasable());
        assert_eq!(tour.price_cents, 1000);

        let points = catalog.key_points.get("t1").unwrap().clone();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].latitude, 44.8180);
        assert_eq!(points[0].longitude, 20.4569);
    }

    #[test]
    fn test_key_point_requires_point_geometry() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": { "type": "LineString", "coordinates": [[0, 0], [1, 1]] },
                "properties": { "kind": "key_point", "id": "kp1", "tour_id": "t1", "name": "x" }
            }]
        }"#;

        assert!(matches!(
            MemoryCatalog::load_from_json(json),
            Err(CatalogError::UnsupportedGeometry)
        ));
    }
}
