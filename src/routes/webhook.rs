// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook route for Stripe events.

use crate::services::stripe::{construct_event, SIGNATURE_HEADER};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Webhook routes. Other methods get 405 from the router.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/stripe", post(handle_event))
}

/// Acknowledgement returned for every verified event.
#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export)
)]
pub struct WebhookAck {
    pub received: bool,
}

/// Handle incoming webhook events (POST).
///
/// The body is taken as raw bytes because the signature covers the exact
/// payload. Once verified, the event is always acknowledged with 200, even
/// when reconciliation steps fail; those failures are only logged.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        tracing::warn!("Webhook request without signature header");
        return (StatusCode::BAD_REQUEST, "Missing Stripe signature").into_response();
    };

    let event = match construct_event(&body, signature, &state.config.stripe_webhook_secret) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Security Alert: Webhook signature verification failed");
            return (StatusCode::BAD_REQUEST, format!("Webhook Error: {}", e)).into_response();
        }
    };

    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        "Webhook event verified"
    );

    let disposition = state.billing.handle_event(&event).await;
    tracing::debug!(event_id = %event.id, ?disposition, "Webhook event processed");

    (StatusCode::OK, Json(WebhookAck { received: true })).into_response()
}
