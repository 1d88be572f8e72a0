// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tour Engine API Server
//!
//! Serves carts, purchases, simulated positions and tour executions.

use std::sync::Arc;
use tour_engine::{
    config::{Config, StoreBackend},
    db::{Catalog, FirestoreDb, MemoryCatalog, MemoryStore, TourStore},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        backend = ?config.store_backend,
        "Starting Tour Engine API"
    );

    let (store, catalog): (Arc<dyn TourStore>, Arc<dyn Catalog>) = match config.store_backend {
        StoreBackend::Firestore => {
            let project_id = config
                .gcp_project_id
                .as_deref()
                .ok_or("GCP_PROJECT_ID is required for the firestore backend")?;
            let db = Arc::new(FirestoreDb::new(project_id).await?);
            let store: Arc<dyn TourStore> = db.clone();
            let catalog: Arc<dyn Catalog> = db;
            (store, catalog)
        }
        StoreBackend::Memory => {
            let catalog = match &config.catalog_path {
                Some(path) => {
                    tracing::info!(path = %path.display(), "Loading tour catalog");
                    MemoryCatalog::load_from_file(path)?
                }
                None => {
                    tracing::warn!("No CATALOG_PATH set, starting with an empty catalog");
                    MemoryCatalog::new()
                }
            };
            tracing::info!(count = catalog.tour_count(), "Tour catalog loaded");
            let store: Arc<dyn TourStore> = Arc::new(MemoryStore::new());
            let catalog: Arc<dyn Catalog> = Arc::new(catalog);
            (store, catalog)
        }
    };

    let state = Arc::new(AppState::new(config.clone(), store, catalog));

    let app = tour_engine::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tour_engine=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
