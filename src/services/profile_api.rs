// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Entitlement lookups through the dashboard API.
//!
//! Lets a session manager running outside the backend read the signed-in
//! user's profile with nothing but the session's access token.

use crate::error::AppError;
use crate::models::{Profile, Session};
use crate::session::ProfileSource;
use async_trait::async_trait;

/// HTTP client for `GET /api/profile`.
#[derive(Clone)]
pub struct ProfileApiClient {
    http: reqwest::Client,
    api_base: String,
}

impl ProfileApiClient {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the caller's profile. A 404 means no profile row.
    pub async fn get_profile(&self, access_token: &str) -> Result<Option<Profile>, AppError> {
        let response = self
            .http
            .get(format!("{}/api/profile", self.api_base))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("profile request failed: {}", e)))?;

        match response.status().as_u16() {
            200..=299 => response.json().await.map(Some).map_err(|e| {
                AppError::Internal(anyhow::anyhow!("profile JSON parse error: {}", e))
            }),
            401 => Err(AppError::InvalidToken),
            404 => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::Internal(anyhow::anyhow!(
                    "profile request returned HTTP {}: {}",
                    status,
                    body
                )))
            }
        }
    }
}

#[async_trait]
impl ProfileSource for ProfileApiClient {
    async fn fetch_profile(&self, session: &Session) -> Result<Option<Profile>, AppError> {
        self.get_profile(&session.access_token).await
    }
}
