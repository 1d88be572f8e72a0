// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cart, checkout and purchase routes.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{CartItem, PurchaseToken, ShoppingCart};
use crate::routes::{ApiJson, ApiResponse};
use crate::services::CheckoutReceipt;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/cart", get(get_cart))
        .route("/api/cart/items", post(add_item))
        .route("/api/cart/items/{tour_id}", delete(remove_item))
        .route("/api/cart/checkout", post(checkout))
        .route("/api/purchases", get(list_purchases))
}

// ─── DTOs ────────────────────────────────────────────────────

#[derive(Serialize, Clone, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CartItemDto {
    pub tour_id: String,
    pub tour_name: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub price_cents: i64,
    pub added_at: String,
}

impl From<&CartItem> for CartItemDto {
    fn from(item: &CartItem) -> Self {
        Self {
            tour_id: item.tour_id.clone(),
            tour_name: item.tour_name.clone(),
            price_cents: item.price_cents,
            added_at: format_utc_rfc3339(item.added_at),
        }
    }
}

#[derive(Serialize, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CartResponse {
    pub items: Vec<CartItemDto>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub total_price_cents: i64,
    pub updated_at: String,
}

impl From<&ShoppingCart> for CartResponse {
    fn from(cart: &ShoppingCart) -> Self {
        Self {
            items: cart.items.iter().map(CartItemDto::from).collect(),
            total_price_cents: cart.total_price_cents(),
            updated_at: format_utc_rfc3339(cart.updated_at),
        }
    }
}

#[derive(Serialize, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PurchaseDto {
    pub tour_id: String,
    pub token: String,
    pub purchased_at: String,
}

impl From<&PurchaseToken> for PurchaseDto {
    fn from(token: &PurchaseToken) -> Self {
        Self {
            tour_id: token.tour_id.clone(),
            token: token.token.clone(),
            purchased_at: format_utc_rfc3339(token.purchased_at),
        }
    }
}

#[derive(Serialize, Debug)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CheckoutResponse {
    pub purchases: Vec<PurchaseDto>,
    pub newly_issued: usize,
    /// Items left in the cart because their tour can no longer be bought
    pub failed_items: Vec<CartItemDto>,
    pub cart: CartResponse,
}

impl From<&CheckoutReceipt> for CheckoutResponse {
    fn from(receipt: &CheckoutReceipt) -> Self {
        Self {
            purchases: receipt.tokens.iter().map(PurchaseDto::from).collect(),
            newly_issued: receipt.newly_issued,
            failed_items: receipt.failed_items.iter().map(CartItemDto::from).collect(),
            cart: CartResponse::from(&receipt.cart),
        }
    }
}

#[derive(Deserialize)]
struct AddItemRequest {
    tour_id: String,
}

// ─── Handlers ────────────────────────────────────────────────

async fn get_cart(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<CartResponse>>> {
    let cart = state.carts.get_cart(&user.user_id).await?;
    Ok(ApiResponse::ok("Cart loaded", CartResponse::from(&cart)))
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ApiJson(body): ApiJson<AddItemRequest>,
) -> Result<Json<ApiResponse<CartResponse>>> {
    let cart = state.carts.add_item(&user.user_id, &body.tour_id).await?;
    Ok(ApiResponse::ok(
        "Tour added to cart",
        CartResponse::from(&cart),
    ))
}

async fn remove_item(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(tour_id): Path<String>,
) -> Result<Json<ApiResponse<CartResponse>>> {
    let cart = state.carts.remove_item(&user.user_id, &tour_id).await?;
    Ok(ApiResponse::ok(
        "Tour removed from cart",
        CartResponse::from(&cart),
    ))
}

async fn checkout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<CheckoutResponse>>> {
    let receipt = state.carts.checkout(&user.user_id).await?;

    let message = if receipt.tokens.is_empty() && receipt.is_complete() {
        "Cart is empty".to_string()
    } else if receipt.is_complete() {
        format!("Purchased {} tour(s)", receipt.tokens.len())
    } else {
        format!(
            "Purchased {} tour(s); {} could not be purchased and remain in the cart",
            receipt.tokens.len(),
            receipt.failed_items.len()
        )
    };

    Ok(ApiResponse::ok(message, CheckoutResponse::from(&receipt)))
}

async fn list_purchases(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Vec<PurchaseDto>>>> {
    let purchases = state.entitlements.list_purchases(&user.user_id).await?;
    Ok(ApiResponse::ok(
        format!("{} purchase(s)", purchases.len()),
        purchases.iter().map(PurchaseDto::from).collect(),
    ))
}
