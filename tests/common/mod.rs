// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::Request;
use cuberama_api::config::Config;
use cuberama_api::db::FirestoreDb;
use cuberama_api::routes::create_router;
use cuberama_api::services::stripe::compute_signature;
use cuberama_api::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::MockServer;

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

/// App wired to an in-memory store and mock upstream APIs.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    /// Stands in for Supabase (`/auth/v1/...`)
    pub identity: MockServer,
    /// Stands in for the Stripe REST API (`/v1/...`)
    pub stripe: MockServer,
}

/// Create a test app with offline dependencies.
#[allow(dead_code)]
pub async fn create_test_app() -> TestApp {
    let identity = MockServer::start().await;
    let stripe = MockServer::start().await;

    let mut config = Config::test_default();
    config.supabase_url = identity.uri();
    config.stripe_api_base = stripe.uri();

    let state = Arc::new(AppState::new(config, FirestoreDb::new_in_memory()));

    TestApp {
        router: create_router(state.clone()),
        state,
        identity,
        stripe,
    }
}

/// `Stripe-Signature` header for a payload, signed now.
#[allow(dead_code)]
pub fn sign(payload: &str, secret: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let signature = compute_signature(payload.as_bytes(), timestamp, secret).unwrap();
    format!("t={},v1={}", timestamp, signature)
}

/// POST to the webhook with an optional signature header.
#[allow(dead_code)]
pub fn webhook_request(payload: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/stripe")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

/// POST a correctly signed event.
#[allow(dead_code)]
pub fn signed_webhook_request(event: &Value) -> Request<Body> {
    let payload = event.to_string();
    let signature = sign(&payload, &Config::test_default().stripe_webhook_secret);
    webhook_request(&payload, Some(&signature))
}

/// Stripe event envelope around a payload object.
#[allow(dead_code)]
pub fn stripe_event(id: &str, event_type: &str, object: Value) -> Value {
    json!({
        "id": id,
        "object": "event",
        "type": event_type,
        "created": 1_700_000_000,
        "livemode": false,
        "data": { "object": object }
    })
}

/// GoTrue user JSON.
#[allow(dead_code)]
pub fn user_json(id: &str, email: &str) -> Value {
    json!({
        "id": id,
        "aud": "authenticated",
        "email": email,
        "app_metadata": {"provider": "email"},
        "user_metadata": {},
        "created_at": "2026-01-01T00:00:00Z"
    })
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Read a response body as text.
#[allow(dead_code)]
pub async fn body_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    String::from_utf8_lossy(&body).into_owned()
}
