// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tour_engine::config::Config;
use tour_engine::db::{FirestoreDb, MemoryCatalog, MemoryStore};
use tour_engine::models::{KeyPoint, Tour, TourStatus};
use tour_engine::routes::create_router;
use tour_engine::AppState;
use tower::ServiceExt;

pub const BELGRADE: &str = "historic-belgrade";
pub const RIVER: &str = "river-walk";
pub const DRAFT: &str = "novi-sad-draft";
pub const GUIDE: &str = "guide-ana";

/// Where the tourist stands in the fixtures, ~44 m south of the first key point.
pub const START: (f64, f64) = (44.8176, 20.4569);
pub const KP1: (f64, f64) = (44.8180, 20.4569);
pub const KP2: (f64, f64) = (44.8225, 20.4490);
pub const KP3: (f64, f64) = (44.8176, 20.4637);

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

#[allow(dead_code)]
pub fn tour(id: &str, guide_id: &str, name: &str, price_cents: i64, published: bool) -> Tour {
    Tour {
        id: id.to_string(),
        guide_id: guide_id.to_string(),
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

#[allow(dead_code)]
pub fn key_point(id: &str, tour_id: &str, order: i32, at: (f64, f64)) -> KeyPoint {
    KeyPoint {
        id: id.to_string(),
        tour_id: tour_id.to_string(),
        latitude: at.0,
        longitude: at.1,
        name: id.to_string(),
        description: String::new(),
        image: None,
        order,
    }
}

/// Two published tours ($10 and $15) and one draft.
#[allow(dead_code)]
pub fn seeded_catalog() -> MemoryCatalog {
    let catalog = MemoryCatalog::new();
    catalog.insert_tour(tour(BELGRADE, GUIDE, "Historic Belgrade", 1000, true));
    catalog.insert_tour(tour(RIVER, "guide-marko", "River Walk", 1500, true));
    catalog.insert_tour(tour(DRAFT, GUIDE, "Petrovaradin at Night", 2000, false));

    catalog.insert_key_point(key_point("kp1", BELGRADE, 1, KP1));
    catalog.insert_key_point(key_point("kp2", BELGRADE, 2, KP2));
    catalog.insert_key_point(key_point("kp3", BELGRADE, 3, KP3));
    catalog.insert_key_point(key_point("bridge", RIVER, 1, (44.8150, 20.4440)));
    catalog
}

#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<MemoryCatalog>,
}

impl TestApp {
    /// Issue a request as `user_id` and decode the JSON body.
    #[allow(dead_code)]
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        user_id: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let token = create_test_jwt(user_id, &self.state.config.jwt_signing_key);
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token));

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}

/// Create a test app on the in-memory backend with the seeded catalog.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let catalog = Arc::new(seeded_catalog());
    let state = Arc::new(AppState::new(
        Config::test_default(),
        store.clone(),
        catalog.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        catalog,
    }
}

/// Create a test JWT token.
#[allow(dead_code)]
pub fn create_test_jwt(user_id: &str, signing_key: &[u8]) -> String {
    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: usize,
        iat: usize,
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + 86400,
        iat: now,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_key),
    )
    .unwrap()
}
