// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cuberama API Server
//!
//! Receives Stripe webhooks, keeps profiles and orders in sync with
//! payments, and serves the order validation and dashboard endpoints.

use cuberama_api::{config::Config, db::FirestoreDb, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Missing secrets are fatal: unverifiable webhooks must never be accepted
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, site_url = %config.site_url, "Starting Cuberama API");

    let db = if config.in_memory_store {
        tracing::warn!("Using in-memory store; data is lost on restart");
        FirestoreDb::new_in_memory()
    } else {
        FirestoreDb::new(&config.gcp_project_id)
            .await
            .expect("Failed to connect to Firestore")
    };

    let state = Arc::new(AppState::new(config.clone(), db));
    tracing::info!(supabase_url = %config.supabase_url, "Upstream clients initialized");

    // Build router
    let app = cuberama_api::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cuberama_api=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
