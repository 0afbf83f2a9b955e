// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Supabase Auth admin API client (service-role key).
//!
//! Used server-side to:
//! - Find or create the account behind a payment
//! - Send recovery emails to accounts created on a purchaser's behalf
//! - Issue one-time magic login links after checkout

use crate::error::AppError;
use crate::models::Identity;
use crate::services::auth_client::provider_error_message;
use crate::validation::normalize_email;
use serde::{Deserialize, Serialize};

const USERS_PER_PAGE: u32 = 200;

/// Kind of one-time link to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Magiclink,
    Recovery,
}

#[derive(Deserialize)]
struct UserList {
    #[serde(default)]
    users: Vec<Identity>,
}

#[derive(Deserialize)]
struct GeneratedLink {
    action_link: String,
}

/// Identity provider admin client.
#[derive(Clone)]
pub struct IdentityAdmin {
    http: reqwest::Client,
    base_url: String,
    service_role_key: String,
}

impl IdentityAdmin {
    /// Create a client for the Supabase project at `supabase_url`.
    pub fn new(supabase_url: &str, service_role_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{}/auth/v1", supabase_url.trim_end_matches('/')),
            service_role_key: service_role_key.into(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
    }

    /// List one page of users (1-based).
    pub async fn list_users(&self, page: u32, per_page: u32) -> Result<Vec<Identity>, AppError> {
        let response = self
            .request(reqwest::Method::GET, "/admin/users")
            .query(&[("page", page.to_string()), ("per_page", per_page.to_string())])
            .send()
            .await
            .map_err(|e| AppError::Identity(e.to_string()))?;

        let list: UserList = check_response_json(response).await?;
        Ok(list.users)
    }

    /// Find an existing account by email, walking every page of users.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<Identity>, AppError> {
        let Some(wanted) = normalize_email(email) else {
            return Ok(None);
        };

        let mut page = 1;
        loop {
            let users = self.list_users(page, USERS_PER_PAGE).await?;
            let count = users.len();

            if let Some(user) = users.into_iter().find(|u| {
                u.email.as_deref().and_then(normalize_email).as_deref() == Some(wanted.as_str())
            }) {
                return Ok(Some(user));
            }

            if count < USERS_PER_PAGE as usize {
                return Ok(None);
            }
            page += 1;
        }
    }

    /// Create an account with a password and an already-confirmed email.
    pub async fn create_user(&self, email: &str, password: &str) -> Result<Identity, AppError> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "email_confirm": true,
        });

        let response = self
            .request(reqwest::Method::POST, "/admin/users")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Identity(e.to_string()))?;

        check_response_json(response).await
    }

    /// Look up an account by ID. Unknown IDs return `None`.
    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<Identity>, AppError> {
        let path = format!("/admin/users/{}", urlencoding::encode(user_id));
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .map_err(|e| AppError::Identity(e.to_string()))?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }

        check_response_json(response).await.map(Some)
    }

    /// Generate a one-time link without sending any email.
    pub async fn generate_link(
        &self,
        link_type: LinkType,
        email: &str,
        redirect_to: &str,
    ) -> Result<String, AppError> {
        let body = serde_json::json!({
            "type": link_type,
            "email": email,
            "redirect_to": redirect_to,
        });

        let response = self
            .request(reqwest::Method::POST, "/admin/generate_link")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Identity(e.to_string()))?;

        let link: GeneratedLink = check_response_json(response).await?;
        Ok(link.action_link)
    }

    /// Email the user a password recovery link.
    pub async fn send_recovery_email(&self, email: &str, redirect_to: &str) -> Result<(), AppError> {
        let response = self
            .request(reqwest::Method::POST, "/recover")
            .query(&[("redirect_to", redirect_to)])
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .map_err(|e| AppError::Identity(e.to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Identity(format!(
            "HTTP {}: {}",
            status,
            provider_error_message(&body)
        )))
    }
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::Identity(format!(
            "HTTP {}: {}",
            status,
            provider_error_message(&body)
        )));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::Identity(format!("JSON parse error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user(id: &str, email: &str) -> serde_json::Value {
        json!({"id": id, "email": email, "app_metadata": {}, "user_metadata": {}})
    }

    #[tokio::test]
    async fn test_find_user_by_email_walks_pages() {
        let server = MockServer::start().await;

        let first_page: Vec<_> = (0..USERS_PER_PAGE)
            .map(|i| user(&format!("id{}", i), &format!("user{}@example.com", i)))
            .collect();

        Mock::given(method("GET"))
            .and(path("/auth/v1/admin/users"))
            .and(query_param("page", "1"))
            .and(header("apikey", "service"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"users": first_page})))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/auth/v1/admin/users"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"users": [user("U1", "a@b.com")]})),
            )
            .mount(&server)
            .await;

        let admin = IdentityAdmin::new(&server.uri(), "service");

        let found = admin.find_user_by_email("A@B.com").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some("U1".to_string()));

        let missing = admin.find_user_by_email("nobody@b.com").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_create_user_confirms_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/users"))
            .and(body_partial_json(json!({"email": "new@b.com", "email_confirm": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(user("N1", "new@b.com")))
            .expect(1)
            .mount(&server)
            .await;

        let admin = IdentityAdmin::new(&server.uri(), "service");
        let created = admin.create_user("new@b.com", "pw").await.unwrap();
        assert_eq!(created.id, "N1");
    }

    #[tokio::test]
    async fn test_get_user_by_id_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/admin/users/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"msg": "User not found"})))
            .mount(&server)
            .await;

        let admin = IdentityAdmin::new(&server.uri(), "service");
        assert!(admin.get_user_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generate_magic_link() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/admin/generate_link"))
            .and(body_partial_json(json!({
                "type": "magiclink",
                "email": "a@b.com",
                "redirect_to": "http://localhost:3000/success?id=cs_1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "U1",
                "email": "a@b.com",
                "action_link": "https://proj.supabase.co/auth/v1/verify?token=abc&type=magiclink",
                "verification_type": "magiclink"
            })))
            .mount(&server)
            .await;

        let admin = IdentityAdmin::new(&server.uri(), "service");
        let link = admin
            .generate_link(
                LinkType::Magiclink,
                "a@b.com",
                "http://localhost:3000/success?id=cs_1",
            )
            .await
            .unwrap();
        assert!(link.contains("type=magiclink"));
    }

    #[tokio::test]
    async fn test_recovery_email_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/recover"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({"msg": "For security purposes, you can only request this once every 60 seconds"})),
            )
            .mount(&server)
            .await;

        let admin = IdentityAdmin::new(&server.uri(), "service");
        let err = admin
            .send_recovery_email("a@b.com", "http://localhost:3000/update-password/")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("once every 60 seconds"));
    }
}
