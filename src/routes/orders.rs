// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Order validation for the post-purchase success page.

use crate::error::{AppError, Result};
use crate::services::LinkType;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// Public order routes. Other methods get 405 from the router.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/validate-order", get(validate_order))
}

#[derive(Debug, Deserialize, Validate)]
struct ValidateOrderParams {
    /// Stripe checkout session ID
    #[serde(rename = "sessionId")]
    #[validate(required, length(min = 1, max = 255))]
    session_id: Option<String>,
}

/// Success page payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export)
)]
pub struct ValidateOrderResponse {
    pub email: Option<String>,
    pub user_id: String,
    pub payment_status: String,
    /// One-time login link, or null when it could not be issued
    pub magic_link: Option<String>,
}

/// Look up a completed checkout and issue a magic login link for its owner.
///
/// Link issuance is best effort: on failure the order details are still
/// returned with `magicLink: null`.
async fn validate_order(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ValidateOrderParams>,
) -> Result<Json<ValidateOrderResponse>> {
    params
        .validate()
        .map_err(|_| AppError::BadRequest("Checkout session ID is required".to_string()))?;
    let session_id = params
        .session_id
        .ok_or_else(|| AppError::BadRequest("Checkout session ID is required".to_string()))?;

    let order = state
        .db
        .get_order(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

    let user = state
        .identity_admin
        .get_user_by_id(&order.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let magic_link = match user.email.as_deref() {
        Some(email) => {
            let redirect_to = state.config.success_redirect_url(&session_id);
            match state
                .identity_admin
                .generate_link(LinkType::Magiclink, email, &redirect_to)
                .await
            {
                Ok(link) => Some(link),
                Err(e) => {
                    tracing::error!(
                        session_id = %session_id,
                        user_id = %order.user_id,
                        error = %e,
                        "Error generating magic link"
                    );
                    None
                }
            }
        }
        None => {
            tracing::warn!(user_id = %order.user_id, "Order owner has no email, skipping magic link");
            None
        }
    };

    Ok(Json(ValidateOrderResponse {
        email: user.email,
        user_id: order.user_id,
        payment_status: order.payment_status,
        magic_link,
    }))
}
