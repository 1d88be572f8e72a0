// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Tours and key points (catalog, read-only)
//! - Carts (one document per tourist)
//! - Purchase tokens (one document per tourist/tour pair)
//! - Positions (one document per tourist)
//! - Executions (one document per execution, plus an active marker per
//!   tourist/tour pair)
//!
//! Revision-checked writes run in a Firestore transaction: the current
//! document is read through the transaction, compared, and the writes are
//! committed together.

use crate::db::{collections, Catalog, CheckoutGrant, TourStore};
use crate::error::AppError;
use crate::models::{
    pair_document_id, KeyPoint, Position, PurchaseToken, ShoppingCart, Tour, TourExecution,
};
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::{FirestoreConsistencySelector, FirestoreTransaction};
use serde::{Deserialize, Serialize};

/// Attempts at a transaction Firestore aborted for contention.
const MAX_TRANSACTION_ATTEMPTS: usize = 5;

/// Points a (tourist, tour) pair at its active execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActiveExecutionMarker {
    execution_id: String,
    tourist_id: String,
    tour_id: String,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    async fn upsert<T>(&self, collection: &str, doc_id: &str, object: &T) -> Result<(), AppError>
    where
        T: Serialize + for<'de> Deserialize<'de> + Send + Sync,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(doc_id)
            .object(object)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Begin a transaction along with a handle whose reads go through it.
    async fn begin(
        &self,
    ) -> Result<(FirestoreTransaction<'_>, firestore::FirestoreDb), AppError> {
        let client = self.get_client()?;
        let transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;
        let reader = client.clone_with_consistency_selector(
            FirestoreConsistencySelector::Transaction(transaction.transaction_id().clone()),
        );
        Ok((transaction, reader))
    }

    /// Commit. `Ok(false)` when Firestore aborted it for contention.
    async fn commit(transaction: FirestoreTransaction<'_>) -> Result<bool, AppError> {
        match transaction.commit().await {
            Ok(_) => Ok(true),
            Err(FirestoreError::DatabaseError(ref e)) if e.retry_possible => {
                tracing::warn!(error = %e.details, "Transaction aborted by contention");
                Ok(false)
            }
            Err(e) => Err(AppError::Database(format!(
                "Failed to commit transaction: {}",
                e
            ))),
        }
    }

    async fn rollback(transaction: FirestoreTransaction<'_>) -> Result<(), AppError> {
        transaction
            .rollback()
            .await
            .map_err(|e| AppError::Database(format!("Failed to rollback transaction: {}", e)))
    }

    async fn read_in<T>(
        reader: &firestore::FirestoreDb,
        collection: &str,
        doc_id: &str,
    ) -> Result<Option<T>, AppError>
    where
        T: for<'de> Deserialize<'de> + Send,
    {
        reader
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(doc_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    fn write_in<T>(
        &self,
        transaction: &mut FirestoreTransaction<'_>,
        collection: &str,
        doc_id: &str,
        object: &T,
    ) -> Result<(), AppError>
    where
        T: Serialize + for<'de> Deserialize<'de> + Send + Sync,
    {
        self.get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(doc_id)
            .object(object)
            .add_to_transaction(transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add write to transaction: {}", e))
            })?;
        Ok(())
    }

    /// Revision check shared by cart writes.
    async fn cart_revision_matches(
        reader: &firestore::FirestoreDb,
        tourist_id: &str,
        expected: u64,
    ) -> Result<bool, AppError> {
        let stored: Option<ShoppingCart> =
            Self::read_in(reader, collections::CARTS, tourist_id).await?;
        Ok(stored.map_or(0, |c| c.revision) == expected)
    }

    /// One attempt at [`TourStore::create_active_execution`]; `None` when
    /// the commit lost a race.
    async fn try_create_active_execution(
        &self,
        execution: &TourExecution,
    ) -> Result<Option<(TourExecution, bool)>, AppError> {
        let marker_id = pair_document_id(&execution.tourist_id, &execution.tour_id);
        let (mut transaction, reader) = self.begin().await?;

        let marker: Option<ActiveExecutionMarker> =
            Self::read_in(&reader, collections::ACTIVE_EXECUTIONS, &marker_id).await?;
        if let Some(marker) = marker {
            let current: Option<TourExecution> =
                Self::read_in(&reader, collections::EXECUTIONS, &marker.execution_id).await?;
            if let Some(current) = current.filter(TourExecution::is_active) {
                Self::rollback(transaction).await?;
                return Ok(Some((current, false)));
            }
        }

        let marker = ActiveExecutionMarker {
            execution_id: execution.id.clone(),
            tourist_id: execution.tourist_id.clone(),
            tour_id: execution.tour_id.clone(),
        };
        self.write_in(
            &mut transaction,
            collections::ACTIVE_EXECUTIONS,
            &marker_id,
            &marker,
        )?;
        self.write_in(
            &mut transaction,
            collections::EXECUTIONS,
            &execution.id,
            execution,
        )?;

        if Self::commit(transaction).await? {
            Ok(Some((execution.clone(), true)))
        } else {
            Ok(None)
        }
    }
}

// ─── Catalog ─────────────────────────────────────────────────────

#[async_trait]
impl Catalog for FirestoreDb {
    async fn get_tour(&self, tour_id: &str) -> Result<Option<Tour>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::TOURS)
            .obj()
            .one(tour_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_key_points(&self, tour_id: &str) -> Result<Vec<KeyPoint>, AppError> {
        let tour_id = tour_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::KEY_POINTS)
            .filter(move |q| q.for_all([q.field("tour_id").eq(tour_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

// ─── Store ───────────────────────────────────────────────────────

#[async_trait]
impl TourStore for FirestoreDb {
    async fn get_cart(&self, tourist_id: &str) -> Result<Option<ShoppingCart>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CARTS)
            .obj()
            .one(tourist_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn replace_cart(&self, cart: &ShoppingCart, expected: u64) -> Result<bool, AppError> {
        let (mut transaction, reader) = self.begin().await?;

        if !Self::cart_revision_matches(&reader, &cart.tourist_id, expected).await? {
            Self::rollback(transaction).await?;
            return Ok(false);
        }

        self.write_in(&mut transaction, collections::CARTS, &cart.tourist_id, cart)?;
        Self::commit(transaction).await
    }

    /// Cart read, token creates and cart write in one transaction.
    async fn commit_checkout(
        &self,
        cart: &ShoppingCart,
        expected: u64,
        tokens: &[PurchaseToken],
    ) -> Result<Option<Vec<CheckoutGrant>>, AppError> {
        let (mut transaction, reader) = self.begin().await?;

        if !Self::cart_revision_matches(&reader, &cart.tourist_id, expected).await? {
            Self::rollback(transaction).await?;
            return Ok(None);
        }

        // All reads must precede the first write
        let mut grants = Vec::with_capacity(tokens.len());
        for token in tokens {
            let doc_id = PurchaseToken::document_id(&token.tourist_id, &token.tour_id);
            let existing: Option<PurchaseToken> =
                Self::read_in(&reader, collections::PURCHASE_TOKENS, &doc_id).await?;
            grants.push(match existing {
                Some(existing) => (existing, false),
                None => (token.clone(), true),
            });
        }

        for (token, is_new) in &grants {
            if *is_new {
                let doc_id = PurchaseToken::document_id(&token.tourist_id, &token.tour_id);
                self.write_in(
                    &mut transaction,
                    collections::PURCHASE_TOKENS,
                    &doc_id,
                    token,
                )?;
            }
        }
        self.write_in(&mut transaction, collections::CARTS, &cart.tourist_id, cart)?;

        if Self::commit(transaction).await? {
            tracing::debug!(
                tourist_id = %cart.tourist_id,
                tokens = grants.len(),
                "Checkout committed"
            );
            Ok(Some(grants))
        } else {
            Ok(None)
        }
    }

    async fn get_purchase(
        &self,
        tourist_id: &str,
        tour_id: &str,
    ) -> Result<Option<PurchaseToken>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PURCHASE_TOKENS)
            .obj()
            .one(PurchaseToken::document_id(tourist_id, tour_id))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create-only insert; an existing document wins.
    async fn insert_purchase_if_absent(
        &self,
        token: &PurchaseToken,
    ) -> Result<(PurchaseToken, bool), AppError> {
        let doc_id = PurchaseToken::document_id(&token.tourist_id, &token.tour_id);

        let inserted: Result<PurchaseToken, _> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::PURCHASE_TOKENS)
            .document_id(&doc_id)
            .object(token)
            .execute()
            .await;

        match inserted {
            Ok(stored) => Ok((stored, true)),
            Err(firestore::errors::FirestoreError::DataConflictError(_)) => {
                tracing::debug!(
                    tourist_id = %token.tourist_id,
                    tour_id = %token.tour_id,
                    "Purchase token already exists (idempotent grant)"
                );
                let existing = self
                    .get_purchase(&token.tourist_id, &token.tour_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Database(format!(
                            "Purchase token {} conflicted but could not be read",
                            doc_id
                        ))
                    })?;
                Ok((existing, false))
            }
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    async fn list_purchases(&self, tourist_id: &str) -> Result<Vec<PurchaseToken>, AppError> {
        let tourist_id = tourist_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::PURCHASE_TOKENS)
            .filter(move |q| q.for_all([q.field("tourist_id").eq(tourist_id.clone())]))
            .order_by([(
                "purchased_at",
                firestore::FirestoreQueryDirection::Ascending,
            )])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_position(&self, tourist_id: &str) -> Result<Option<Position>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::POSITIONS)
            .obj()
            .one(tourist_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn put_position(&self, position: &Position) -> Result<(), AppError> {
        self.upsert(collections::POSITIONS, &position.tourist_id, position)
            .await
    }

    async fn get_execution(&self, execution_id: &str) -> Result<Option<TourExecution>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::EXECUTIONS)
            .obj()
            .one(execution_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_active_execution(
        &self,
        tourist_id: &str,
        tour_id: &str,
    ) -> Result<Option<TourExecution>, AppError> {
        let marker: Option<ActiveExecutionMarker> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ACTIVE_EXECUTIONS)
            .obj()
            .one(pair_document_id(tourist_id, tour_id))
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let Some(marker) = marker else {
            return Ok(None);
        };
        Ok(self
            .get_execution(&marker.execution_id)
            .await?
            .filter(TourExecution::is_active))
    }

    async fn list_executions(&self, tourist_id: &str) -> Result<Vec<TourExecution>, AppError> {
        let tourist_id = tourist_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::EXECUTIONS)
            .filter(move |q| q.for_all([q.field("tourist_id").eq(tourist_id.clone())]))
            .order_by([("started_at", firestore::FirestoreQueryDirection::Descending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Retries transactions aborted by contention; a lost race that leaves
    /// another execution active returns that one.
    async fn create_active_execution(
        &self,
        execution: &TourExecution,
    ) -> Result<(TourExecution, bool), AppError> {
        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            if let Some(outcome) = self.try_create_active_execution(execution).await? {
                return Ok(outcome);
            }
            tracing::debug!(
                execution_id = %execution.id,
                attempt,
                "Retrying execution start"
            );
        }
        Err(AppError::Database(format!(
            "Execution {} could not be started: too much contention",
            execution.id
        )))
    }

    async fn replace_execution(
        &self,
        execution: &TourExecution,
        expected: u64,
    ) -> Result<bool, AppError> {
        let (mut transaction, reader) = self.begin().await?;

        let stored: Option<TourExecution> =
            Self::read_in(&reader, collections::EXECUTIONS, &execution.id).await?;
        if stored.map(|e| e.revision) != Some(expected) {
            Self::rollback(transaction).await?;
            return Ok(false);
        }

        let marker_id = pair_document_id(&execution.tourist_id, &execution.tour_id);
        let release_marker = if execution.status.is_terminal() {
            let marker: Option<ActiveExecutionMarker> =
                Self::read_in(&reader, collections::ACTIVE_EXECUTIONS, &marker_id).await?;
            marker.is_some_and(|m| m.execution_id == execution.id)
        } else {
            false
        };

        self.write_in(
            &mut transaction,
            collections::EXECUTIONS,
            &execution.id,
            execution,
        )?;
        if release_marker {
            self.get_client()?
                .fluent()
                .delete()
                .from(collections::ACTIVE_EXECUTIONS)
                .document_id(&marker_id)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add delete to transaction: {}", e))
                })?;
        }

        Self::commit(transaction).await
    }
}
