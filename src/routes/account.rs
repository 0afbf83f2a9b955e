// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dashboard routes for signed-in users.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{Order, Profile};
use crate::AppState;
use axum::{extract::State, routing::get, Extension, Json, Router};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Account routes (require authentication).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/profile", get(get_profile))
        .route("/api/orders", get(get_orders))
}

/// Entitlement of the current user.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export)
)]
pub struct ProfileResponse {
    pub id: String,
    pub email: String,
    pub pro_status: bool,
    pub updated_at: Option<String>,
}

impl From<Profile> for ProfileResponse {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id,
            email: profile.email,
            pro_status: profile.pro_status,
            updated_at: profile.updated_at,
        }
    }
}

/// Get the caller's profile. Users without a row are simply not pro.
async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ProfileResponse>> {
    let response = match state.db.get_profile(&user.user_id).await? {
        Some(profile) => profile.into(),
        None => ProfileResponse {
            id: user.user_id,
            email: user.email.unwrap_or_default(),
            pro_status: false,
            updated_at: None,
        },
    };

    Ok(Json(response))
}

/// A past purchase.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export)
)]
pub struct OrderResponse {
    pub id: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub payment_status: String,
    pub metadata: HashMap<String, String>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            amount_total: order.amount_total,
            currency: order.currency,
            payment_status: order.payment_status,
            metadata: order.metadata,
        }
    }
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export)
)]
pub struct OrdersResponse {
    pub orders: Vec<OrderResponse>,
}

/// List the caller's orders.
async fn get_orders(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<OrdersResponse>> {
    let orders = state.db.get_orders_for_user(&user.user_id).await?;

    Ok(Json(OrdersResponse {
        orders: orders.into_iter().map(OrderResponse::from).collect(),
    }))
}
