// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cart and checkout behavior through the service layer.

mod common;
use common::{create_test_app, BELGRADE, DRAFT, RIVER};
use tour_engine::error::AppError;

#[tokio::test]
async fn test_checkout_two_tours_resets_cart() {
    let app = create_test_app();
    let carts = &app.state.carts;

    carts.add_item("alice", BELGRADE).await.unwrap();
    let cart = carts.add_item("alice", RIVER).await.unwrap();
    assert_eq!(cart.total_price_cents(), 2500);

    let receipt = carts.checkout("alice").await.unwrap();
    assert_eq!(receipt.tokens.len(), 2);
    assert_eq!(receipt.newly_issued, 2);
    assert!(receipt.is_complete());
    assert_eq!(receipt.cart.total_price_cents(), 0);

    let owned = app.state.entitlements.list_owned("alice").await.unwrap();
    assert!(owned.contains(BELGRADE));
    assert!(owned.contains(RIVER));

    let cart = carts.get_cart("alice").await.unwrap();
    assert!(cart.is_empty());
}

#[tokio::test]
async fn test_repurchase_returns_existing_token() {
    let app = create_test_app();
    let carts = &app.state.carts;

    carts.add_item("alice", BELGRADE).await.unwrap();
    let first = carts.checkout("alice").await.unwrap();

    // Adding an owned tour is allowed; checking it out again is a no-op grant
    carts.add_item("alice", BELGRADE).await.unwrap();
    let second = carts.checkout("alice").await.unwrap();

    assert_eq!(second.newly_issued, 0);
    assert_eq!(first.tokens[0].token, second.tokens[0].token);
    assert_eq!(
        app.state
            .entitlements
            .list_purchases("alice")
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_concurrent_checkouts_grant_once() {
    let app = create_test_app();
    let carts = app.state.carts.clone();
    carts.add_item("alice", BELGRADE).await.unwrap();
    carts.add_item("alice", RIVER).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let carts = carts.clone();
            tokio::spawn(async move { carts.checkout("alice").await })
        })
        .collect();

    let mut issued = 0;
    for handle in handles {
        issued += handle.await.unwrap().unwrap().newly_issued;
    }

    assert_eq!(issued, 2);
    assert_eq!(
        app.state
            .entitlements
            .list_purchases("alice")
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn test_concurrent_grants_agree_on_token() {
    let app = create_test_app();
    let entitlements = app.state.entitlements.clone();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let entitlements = entitlements.clone();
            tokio::spawn(async move { entitlements.grant("bob", RIVER).await })
        })
        .collect();

    let mut tokens = std::collections::BTreeSet::new();
    let mut new_grants = 0;
    for handle in handles {
        let grant = handle.await.unwrap().unwrap();
        if grant.is_new() {
            new_grants += 1;
        }
        tokens.insert(grant.into_token().token);
    }

    assert_eq!(new_grants, 1);
    assert_eq!(tokens.len(), 1);
}

#[tokio::test]
async fn test_unpublished_tour_cannot_be_added() {
    let app = create_test_app();
    let err = app.state.carts.add_item("alice", DRAFT).await.unwrap_err();
    assert!(matches!(err, AppError::TourNotPurchasable(_)));
    assert!(err.is_business_rejection());
}

#[tokio::test]
async fn test_tour_unpublished_after_add_fails_at_checkout() {
    let app = create_test_app();
    app.state.carts.add_item("alice", BELGRADE).await.unwrap();
    app.state.carts.add_item("alice", RIVER).await.unwrap();
    app.catalog.unpublish_tour(RIVER);

    let receipt = app.state.carts.checkout("alice").await.unwrap();
    assert_eq!(receipt.tokens.len(), 1);
    assert_eq!(receipt.failed_items[0].tour_id, RIVER);
    assert!(!app
        .state
        .entitlements
        .is_entitled("alice", RIVER)
        .await
        .unwrap());

    // Republishing lets the leftover item through on retry
    app.catalog.publish_tour(RIVER, 1500);
    let retry = app.state.carts.checkout("alice").await.unwrap();
    assert!(retry.is_complete());
    assert!(retry.cart.is_empty());
}

#[tokio::test]
async fn test_carts_are_per_tourist() {
    let app = create_test_app();
    app.state.carts.add_item("alice", BELGRADE).await.unwrap();

    let bob = app.state.carts.get_cart("bob").await.unwrap();
    assert!(bob.is_empty());

    app.state.carts.checkout("bob").await.unwrap();
    let alice = app.state.carts.get_cart("alice").await.unwrap();
    assert!(alice.contains(BELGRADE));
}

#[tokio::test]
async fn test_remove_item() {
    let app = create_test_app();
    app.state.carts.add_item("alice", BELGRADE).await.unwrap();
    app.state.carts.add_item("alice", RIVER).await.unwrap();

    let cart = app.state.carts.remove_item("alice", BELGRADE).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.total_price_cents(), 1500);

    // Removing something absent is not an error
    let cart = app.state.carts.remove_item("alice", BELGRADE).await.unwrap();
    assert_eq!(cart.items.len(), 1);
}
