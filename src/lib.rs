// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cuberama API: accounts, entitlement and billing glue for Cuberama 3D.
//!
//! This crate provides the backend that reconciles Stripe payments into
//! user profiles, validates completed orders for the success page, and the
//! session manager used by clients to track who is signed in and pro.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
pub mod time_utils;
pub mod validation;

use config::Config;
use db::FirestoreDb;
use services::{BillingService, IdentityAdmin, StripeClient};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    pub identity_admin: IdentityAdmin,
    pub billing: BillingService,
}

impl AppState {
    /// Wire up the upstream clients from configuration.
    pub fn new(config: Config, db: FirestoreDb) -> Self {
        let identity_admin =
            IdentityAdmin::new(&config.supabase_url, config.supabase_service_role_key.clone());
        let stripe = StripeClient::new(
            config.stripe_api_base.clone(),
            config.stripe_secret_key.clone(),
        );
        let billing = BillingService::new(
            db.clone(),
            identity_admin.clone(),
            stripe,
            config.recovery_redirect_url(),
        );

        Self {
            config,
            db,
            identity_admin,
            billing,
        }
    }
}
