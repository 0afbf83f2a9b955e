// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! The webhook signing secret is mandatory: the process refuses to start
//! without it rather than accepting unverifiable payment events.

use std::env;

const DEFAULT_SITE_URL: &str = "http://localhost:3000";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Public site URL used to build redirect targets
    pub site_url: String,
    /// Supabase project URL (e.g. https://xyz.supabase.co)
    pub supabase_url: String,
    /// Supabase anon key (public, used by the user-facing auth client)
    pub supabase_anon_key: String,
    /// Stripe REST API base URL
    pub stripe_api_base: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Use the in-memory store instead of Firestore
    pub in_memory_store: bool,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// Stripe secret API key
    pub stripe_secret_key: String,
    /// Stripe webhook signing secret (whsec_...)
    pub stripe_webhook_secret: String,
    /// Supabase service-role key for admin calls
    pub supabase_service_role_key: String,
    /// Supabase JWT secret used to verify access tokens (raw bytes)
    pub supabase_jwt_secret: Vec<u8>,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            site_url: DEFAULT_SITE_URL.to_string(),
            supabase_url: "http://127.0.0.1:54321".to_string(),
            supabase_anon_key: "test_anon_key".to_string(),
            stripe_api_base: DEFAULT_STRIPE_API_BASE.to_string(),
            gcp_project_id: "test-project".to_string(),
            in_memory_store: true,
            port: 8080,
            stripe_secret_key: "sk_test_123".to_string(),
            stripe_webhook_secret: "whsec_test_secret".to_string(),
            supabase_service_role_key: "test_service_role_key".to_string(),
            supabase_jwt_secret: b"test_jwt_secret_32_bytes_minimum".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            site_url: env::var("SITE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_SITE_URL.to_string()),
            supabase_url: env::var("SUPABASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("SUPABASE_URL"))?,
            supabase_anon_key: env::var("SUPABASE_ANON_KEY").unwrap_or_default(),
            stripe_api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| DEFAULT_STRIPE_API_BASE.to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            in_memory_store: env::var("IN_MEMORY_STORE")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            stripe_secret_key: required_secret("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required_secret("STRIPE_WEBHOOK_SECRET")?,
            supabase_service_role_key: required_secret("SUPABASE_SERVICE_ROLE_KEY")?,
            supabase_jwt_secret: required_secret("SUPABASE_JWT_SECRET")?.into_bytes(),
        })
    }

    /// Where recovery emails send the user to pick a new password.
    pub fn recovery_redirect_url(&self) -> String {
        format!("{}/update-password/", self.site_url)
    }

    /// Post-purchase landing page for a checkout session.
    pub fn success_redirect_url(&self, checkout_session_id: &str) -> String {
        format!(
            "{}/success?id={}",
            self.site_url,
            urlencoding::encode(checkout_session_id)
        )
    }
}

/// Read a secret, rejecting missing or blank values.
fn required_secret(name: &'static str) -> Result<String, ConfigError> {
    let value = env::var(name).map_err(|_| ConfigError::Missing(name))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Missing(name));
    }
    Ok(value.to_string())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
