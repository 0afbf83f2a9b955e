// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User-facing Supabase Auth client (anon key).
//!
//! Holds the current session in memory and broadcasts every change as an
//! [`AuthStateChange`], which is what the session manager listens to.
//!
//! Handles:
//! - Email/password sign-in and registration
//! - OAuth and magic-link redirects (session adoption from the URL fragment)
//! - Transparent access-token refresh
//! - Sign-out, password reset requests and profile/password updates
//! - Avatar upload and account deletion

use crate::models::{AuthChangeEvent, AuthStateChange, Identity, Session};
use crate::validation::unmet_password_rules;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, RwLock};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Storage bucket holding user avatars at `{user_id}/avatar.png`.
const AVATAR_BUCKET: &str = "avatars";
pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

/// Errors from user-facing auth flows. Display text is meant for the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("{message}")]
    Provider { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Auth session missing!")]
    NotSignedIn,

    #[error("Password requirements not met: {}", .0.join(", "))]
    WeakPassword(Vec<&'static str>),

    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),

    #[error("File is too large. The maximum size is 2MB.")]
    AvatarTooLarge,
}

/// Pull the human-readable message out of a GoTrue error body.
pub fn provider_error_message(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["msg", "message", "error_description", "error"] {
            if let Some(msg) = map.get(key).and_then(Value::as_str) {
                return msg.to_string();
            }
        }
    }

    let body = body.trim();
    if body.is_empty() {
        "Unknown error".to_string()
    } else {
        body.to_string()
    }
}

/// Result of a registration attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    /// Email confirmation is disabled; the user is signed in.
    SignedIn(Session),
    /// A confirmation email was sent; no session yet.
    ConfirmationSent(Identity),
}

/// Changes to the signed-in user.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Merged into `user_metadata` (full_name, nickname, avatar_url, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

/// Supabase Auth client for a single end user.
pub struct AuthClient {
    http: reqwest::Client,
    project_url: String,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<Session>>,
    /// Bumped on every sign-out, under the session write lock.
    sign_out_epoch: AtomicU64,
    events: broadcast::Sender<AuthStateChange>,
}

impl AuthClient {
    pub fn new(supabase_url: &str, anon_key: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let project_url = supabase_url.trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{}/auth/v1", project_url),
            project_url,
            anon_key: anon_key.into(),
            session: RwLock::new(None),
            sign_out_epoch: AtomicU64::new(0),
            events,
        }
    }

    /// Listen for session changes.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }

    fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        tracing::debug!(event = ?event, "Auth state change");
        // No receivers is fine; nobody is listening yet.
        let _ = self.events.send(AuthStateChange { event, session });
    }

    async fn store(&self, session: Option<Session>) {
        *self.session.write().await = session;
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
    }

    /// Restore a previously persisted session (e.g. from disk) and announce it.
    pub async fn restore_session(&self, session: Option<Session>) {
        self.store(session.clone()).await;
        self.emit(AuthChangeEvent::InitialSession, session);
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let response = self
            .request(reqwest::Method::POST, "/token")
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let session: Session = check_response_json(response).await?;
        let session = session.with_expiry_from(now_secs());

        tracing::info!(user_id = %session.user.id, "Signed in with password");
        self.store(Some(session.clone())).await;
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Register a new account.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<SignUpOutcome, AuthError> {
        let mut body = serde_json::json!({ "email": email, "password": password });
        if let Some(data) = metadata {
            body["data"] = Value::Object(data);
        }

        let response = self
            .request(reqwest::Method::POST, "/signup")
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let value: Value = check_response_json(response).await?;

        if value.get("access_token").is_some() {
            let session: Session = serde_json::from_value(value)
                .map_err(|e| AuthError::Network(format!("JSON parse error: {}", e)))?;
            let session = session.with_expiry_from(now_secs());
            self.store(Some(session.clone())).await;
            self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
            return Ok(SignUpOutcome::SignedIn(session));
        }

        let user: Identity = serde_json::from_value(value)
            .map_err(|e| AuthError::Network(format!("JSON parse error: {}", e)))?;
        tracing::info!(user_id = %user.id, "Sign-up pending email confirmation");
        Ok(SignUpOutcome::ConfirmationSent(user))
    }

    /// URL to send the browser to for an OAuth sign-in.
    pub fn oauth_authorize_url(&self, provider: &str, redirect_to: &str) -> String {
        format!(
            "{}/authorize?provider={}&redirect_to={}",
            self.base_url,
            urlencoding::encode(provider),
            urlencoding::encode(redirect_to)
        )
    }

    /// Adopt the session carried in an OAuth or magic-link redirect URL.
    pub async fn session_from_redirect(&self, redirect_url: &str) -> Result<Session, AuthError> {
        let params = parse_fragment(redirect_url);
        let get = |key: &str| fragment_param(&params, key);

        if let Some(description) = get("error_description") {
            return Err(AuthError::Provider {
                status: 400,
                message: description.to_string(),
            });
        }

        let access_token = get("access_token")
            .ok_or_else(|| AuthError::InvalidRedirect("missing access_token".to_string()))?;
        let refresh_token = get("refresh_token")
            .ok_or_else(|| AuthError::InvalidRedirect("missing refresh_token".to_string()))?;
        let expires_in = get("expires_in").and_then(|v| v.parse().ok()).unwrap_or(0);
        let expires_at = get("expires_at").and_then(|v| v.parse().ok());
        let is_recovery = get("type") == Some("recovery");

        let user = self.get_user(access_token).await?;

        let session = Session {
            access_token: access_token.to_string(),
            token_type: get("token_type").unwrap_or("bearer").to_string(),
            expires_in,
            expires_at,
            refresh_token: refresh_token.to_string(),
            user,
        }
        .with_expiry_from(now_secs());

        self.store(Some(session.clone())).await;
        let event = if is_recovery {
            AuthChangeEvent::PasswordRecovery
        } else {
            AuthChangeEvent::SignedIn
        };
        self.emit(event, Some(session.clone()));
        Ok(session)
    }

    /// Fetch the user an access token belongs to.
    pub async fn get_user(&self, access_token: &str) -> Result<Identity, AuthError> {
        let response = self
            .request(reqwest::Method::GET, "/user")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        check_response_json(response).await
    }

    /// Current session, refreshed first if the access token has expired.
    pub async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        let (session, epoch) = {
            let current = self.session.read().await;
            (current.clone(), self.sign_out_epoch.load(Ordering::SeqCst))
        };
        match session {
            Some(s) if s.is_expired_at(now_secs()) => {
                match self.refresh_since(&s.refresh_token, epoch).await {
                    Ok(session) => Ok(Some(session)),
                    Err(AuthError::NotSignedIn) => Ok(None),
                    Err(e) => Err(e),
                }
            }
            other => Ok(other),
        }
    }

    /// Exchange a refresh token for a new session.
    ///
    /// A rejected refresh token ends the session locally. If the user signs
    /// out while the request is in flight, the new tokens are discarded and
    /// [`AuthError::NotSignedIn`] is returned.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let epoch = self.sign_out_epoch.load(Ordering::SeqCst);
        self.refresh_since(refresh_token, epoch).await
    }

    async fn refresh_since(&self, refresh_token: &str, epoch: u64) -> Result<Session, AuthError> {
        let response = self
            .request(reqwest::Method::POST, "/token")
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        match check_response_json::<Session>(response).await {
            Ok(session) => {
                let session = session.with_expiry_from(now_secs());
                let mut current = self.session.write().await;
                if self.sign_out_epoch.load(Ordering::SeqCst) != epoch {
                    tracing::debug!("Signed out during token refresh, discarding new session");
                    return Err(AuthError::NotSignedIn);
                }
                *current = Some(session.clone());
                self.emit(AuthChangeEvent::TokenRefreshed, Some(session.clone()));
                Ok(session)
            }
            Err(err @ AuthError::Provider { .. }) => {
                tracing::warn!(error = %err, "Refresh token rejected, signing out locally");
                self.store(None).await;
                self.emit(AuthChangeEvent::SignedOut, None);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Sign out. Local state is cleared even if the remote call fails.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self.take_session().await;

        let result = match session {
            Some(session) => self
                .request(reqwest::Method::POST, "/logout")
                .bearer_auth(&session.access_token)
                .send()
                .await
                .map_err(|e| AuthError::Network(e.to_string()))
                .and_then(|r| {
                    if r.status().is_success() || r.status().as_u16() == 401 {
                        Ok(())
                    } else {
                        Err(AuthError::Provider {
                            status: r.status().as_u16(),
                            message: format!("Sign out failed with HTTP {}", r.status()),
                        })
                    }
                }),
            None => Ok(()),
        };

        self.emit(AuthChangeEvent::SignedOut, None);
        result
    }

    async fn take_session(&self) -> Option<Session> {
        let mut current = self.session.write().await;
        self.sign_out_epoch.fetch_add(1, Ordering::SeqCst);
        current.take()
    }

    /// Delete the signed-in user's account, then end the session locally.
    ///
    /// The account no longer exists afterwards, so no remote logout is sent.
    pub async fn delete_account(&self) -> Result<(), AuthError> {
        let session = self.current_session().await?.ok_or(AuthError::NotSignedIn)?;

        let response = self
            .http
            .post(format!("{}/rest/v1/rpc/delete_user", self.project_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        check_response(response).await?;

        tracing::info!(user_id = %session.user.id, "Account deleted");
        self.take_session().await;
        self.emit(AuthChangeEvent::SignedOut, None);
        Ok(())
    }

    /// Upload a new avatar image and point `user_metadata.avatar_url` at it.
    ///
    /// Returns the updated user. The stored URL carries a cache-busting
    /// timestamp since the object path never changes.
    pub async fn upload_avatar(
        &self,
        image: Vec<u8>,
        content_type: &str,
    ) -> Result<Identity, AuthError> {
        if image.len() > MAX_AVATAR_BYTES {
            return Err(AuthError::AvatarTooLarge);
        }

        let session = self.current_session().await?.ok_or(AuthError::NotSignedIn)?;
        let object_path = format!("{}/avatar.png", session.user.id);

        let response = self
            .http
            .post(format!(
                "{}/storage/v1/object/{}/{}",
                self.project_url, AVATAR_BUCKET, object_path
            ))
            .header("apikey", &self.anon_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .bearer_auth(&session.access_token)
            .body(image)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        check_response(response).await?;

        let public_url = format!(
            "{}/storage/v1/object/public/{}/{}?t={}",
            self.project_url,
            AVATAR_BUCKET,
            object_path,
            chrono::Utc::now().timestamp_millis()
        );

        let mut data = Map::new();
        data.insert("avatar_url".to_string(), Value::String(public_url));
        self.update_user(&UserUpdate {
            password: None,
            data: Some(data),
        })
        .await
    }

    /// Email a password-reset link.
    pub async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), AuthError> {
        let response = self
            .request(reqwest::Method::POST, "/recover")
            .query(&[("redirect_to", redirect_to)])
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        check_response(response).await
    }

    /// Update the signed-in user's metadata and/or password.
    pub async fn update_user(&self, update: &UserUpdate) -> Result<Identity, AuthError> {
        if let Some(password) = &update.password {
            let unmet = unmet_password_rules(password);
            if !unmet.is_empty() {
                return Err(AuthError::WeakPassword(unmet));
            }
        }

        let session = self.current_session().await?.ok_or(AuthError::NotSignedIn)?;

        let response = self
            .request(reqwest::Method::PUT, "/user")
            .bearer_auth(&session.access_token)
            .json(update)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let user: Identity = check_response_json(response).await?;

        let updated = Session {
            user: user.clone(),
            ..session
        };
        self.store(Some(updated.clone())).await;
        self.emit(AuthChangeEvent::UserUpdated, Some(updated));
        Ok(user)
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Key/value pairs from the fragment (or, failing that, the query) of a URL.
fn parse_fragment(url: &str) -> Vec<(String, String)> {
    let raw = match url.split_once('#') {
        Some((_, fragment)) => fragment,
        None => url.split_once('?').map(|(_, q)| q).unwrap_or(""),
    };

    raw.split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| {
            let v = v.replace('+', " ");
            let v = urlencoding::decode(&v)
                .map(|d| d.into_owned())
                .unwrap_or(v);
            (k.to_string(), v)
        })
        .collect()
}

fn fragment_param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

async fn check_response(response: reqwest::Response) -> Result<(), AuthError> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(AuthError::Provider {
        status,
        message: provider_error_message(&body),
    })
}

async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AuthError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Provider {
            status,
            message: provider_error_message(&body),
        });
    }

    response
        .json()
        .await
        .map_err(|e| AuthError::Network(format!("JSON parse error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{
        body_bytes, body_partial_json, header, method, path, path_regex, query_param,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn expired_session() -> Session {
        serde_json::from_value(json!({
            "access_token": "at_old",
            "expires_in": 3600,
            "expires_at": 1,
            "refresh_token": "rt_old",
            "user": {"id": "U1"}
        }))
        .unwrap()
    }

    async fn signed_in_client(server: &MockServer) -> AuthClient {
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("at_1", 3600)))
            .mount(server)
            .await;
        let client = AuthClient::new(&server.uri(), "anon");
        client.sign_in_with_password("a@b.com", "pw").await.unwrap();
        client
    }

    fn session_json(access_token: &str, expires_in: i64) -> Value {
        json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": expires_in,
            "refresh_token": "rt_1",
            "user": {"id": "U1", "email": "a@b.com"}
        })
    }

    #[test]
    fn test_provider_error_message() {
        assert_eq!(
            provider_error_message(r#"{"code":400,"msg":"Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(
            provider_error_message(r#"{"error":"invalid_grant","error_description":"Refresh Token Not Found"}"#),
            "Refresh Token Not Found"
        );
        assert_eq!(provider_error_message("  "), "Unknown error");
        assert_eq!(provider_error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_parse_fragment() {
        let params = parse_fragment(
            "http://localhost:3000/success?id=cs_1#access_token=at%2B1&expires_in=3600&type=magiclink",
        );
        assert!(params.contains(&("access_token".to_string(), "at+1".to_string())));
        assert!(params.contains(&("type".to_string(), "magiclink".to_string())));
        assert!(!params.iter().any(|(k, _)| k == "id"));
    }

    #[test]
    fn test_oauth_authorize_url() {
        let client = AuthClient::new("https://proj.supabase.co/", "anon");
        assert_eq!(
            client.oauth_authorize_url("google", "http://localhost:3000/dashboard"),
            "https://proj.supabase.co/auth/v1/authorize?provider=google&redirect_to=http%3A%2F%2Flocalhost%3A3000%2Fdashboard"
        );
    }

    #[tokio::test]
    async fn test_sign_in_emits_signed_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", "anon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("at_1", 3600)))
            .mount(&server)
            .await;

        let client = AuthClient::new(&server.uri(), "anon");
        let mut events = client.subscribe();

        let session = client.sign_in_with_password("a@b.com", "pw").await.unwrap();
        assert_eq!(session.user.id, "U1");
        assert!(session.expires_at.is_some());

        let change = events.recv().await.unwrap();
        assert_eq!(change.event, AuthChangeEvent::SignedIn);
        assert_eq!(client.current_session().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_sign_in_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"code": 400, "msg": "Invalid login credentials"})),
            )
            .mount(&server)
            .await;

        let client = AuthClient::new(&server.uri(), "anon");
        let err = client.sign_in_with_password("a@b.com", "bad").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert!(client.current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_up_pending_confirmation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "U2", "email": "n@b.com"})),
            )
            .mount(&server)
            .await;

        let client = AuthClient::new(&server.uri(), "anon");
        let outcome = client.sign_up("n@b.com", "Sup3r(secret", None).await.unwrap();
        assert!(matches!(outcome, SignUpOutcome::ConfirmationSent(user) if user.id == "U2"));
        assert!(client.current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .and(body_partial_json(json!({"refresh_token": "rt_old"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("at_new", 3600)))
            .expect(1)
            .mount(&server)
            .await;

        let client = AuthClient::new(&server.uri(), "anon");
        client.restore_session(Some(expired_session())).await;

        let mut events = client.subscribe();
        let session = client.current_session().await.unwrap().unwrap();
        assert_eq!(session.access_token, "at_new");
        assert_eq!(events.recv().await.unwrap().event, AuthChangeEvent::TokenRefreshed);
    }

    #[tokio::test]
    async fn test_sign_out_clears_session_even_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("at_1", 3600)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = AuthClient::new(&server.uri(), "anon");
        client.sign_in_with_password("a@b.com", "pw").await.unwrap();
        let mut events = client.subscribe();

        assert!(client.sign_out().await.is_err());
        assert!(client.current_session().await.unwrap().is_none());
        assert_eq!(events.recv().await.unwrap().event, AuthChangeEvent::SignedOut);
    }

    #[tokio::test]
    async fn test_magic_link_redirect_adopts_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer at_ml"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "U1", "email": "a@b.com"})),
            )
            .mount(&server)
            .await;

        let client = AuthClient::new(&server.uri(), "anon");
        let mut events = client.subscribe();

        let session = client
            .session_from_redirect(
                "http://localhost:3000/success?id=cs_1#access_token=at_ml&refresh_token=rt_ml&expires_in=3600&token_type=bearer&type=magiclink",
            )
            .await
            .unwrap();

        assert_eq!(session.user.id, "U1");
        assert_eq!(events.recv().await.unwrap().event, AuthChangeEvent::SignedIn);
    }

    #[tokio::test]
    async fn test_redirect_error_is_surfaced() {
        let client = AuthClient::new("http://127.0.0.1:9", "anon");
        let err = client
            .session_from_redirect(
                "http://localhost:3000/#error=access_denied&error_description=Email+link+is+invalid+or+has+expired",
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Email link is invalid or has expired");
    }

    #[tokio::test]
    async fn test_weak_password_rejected_locally() {
        let client = AuthClient::new("http://127.0.0.1:9", "anon");
        let update = UserUpdate {
            password: Some("weak".to_string()),
            data: None,
        };
        let err = client.update_user(&update).await.unwrap_err();
        assert!(matches!(err, AuthError::WeakPassword(ref unmet) if unmet.len() == 4));
    }

    #[tokio::test]
    async fn test_update_user_emits_user_updated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_json("at_1", 3600)))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/auth/v1/user"))
            .and(body_partial_json(json!({"data": {"nickname": "ada"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "U1",
                "email": "a@b.com",
                "user_metadata": {"nickname": "ada"}
            })))
            .mount(&server)
            .await;

        let client = AuthClient::new(&server.uri(), "anon");
        client.sign_in_with_password("a@b.com", "pw").await.unwrap();
        let mut events = client.subscribe();

        let mut data = Map::new();
        data.insert("nickname".to_string(), json!("ada"));
        let user = client
            .update_user(&UserUpdate {
                password: None,
                data: Some(data),
            })
            .await
            .unwrap();

        assert_eq!(user.nickname(), Some("ada"));
        assert_eq!(events.recv().await.unwrap().event, AuthChangeEvent::UserUpdated);
    }

    #[tokio::test]
    async fn test_sign_out_during_refresh_discards_new_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(session_json("at_new", 3600))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = Arc::new(AuthClient::new(&server.uri(), "anon"));
        client.restore_session(Some(expired_session())).await;
        let mut events = client.subscribe();

        let refreshing = tokio::spawn({
            let client = client.clone();
            async move { client.current_session().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.sign_out().await.unwrap();

        assert_eq!(refreshing.await.unwrap(), Ok(None));
        assert!(client.current_session().await.unwrap().is_none());
        assert_eq!(events.recv().await.unwrap().event, AuthChangeEvent::SignedOut);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_delete_account_signs_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/delete_user"))
            .and(header("authorization", "Bearer at_1"))
            .and(header("apikey", "anon"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let client = signed_in_client(&server).await;
        let mut events = client.subscribe();

        client.delete_account().await.unwrap();

        assert!(client.current_session().await.unwrap().is_none());
        assert_eq!(events.recv().await.unwrap().event, AuthChangeEvent::SignedOut);
    }

    #[tokio::test]
    async fn test_delete_account_failure_keeps_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/delete_user"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"message": "permission denied"})),
            )
            .mount(&server)
            .await;

        let client = signed_in_client(&server).await;

        let err = client.delete_account().await.unwrap_err();
        assert_eq!(err.to_string(), "permission denied");
        assert!(client.current_session().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_account_requires_session() {
        let client = AuthClient::new("http://127.0.0.1:9", "anon");
        assert_eq!(client.delete_account().await, Err(AuthError::NotSignedIn));
    }

    #[tokio::test]
    async fn test_upload_avatar_sets_avatar_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/avatars/U1/avatar.png"))
            .and(header("x-upsert", "true"))
            .and(header("content-type", "image/png"))
            .and(header("authorization", "Bearer at_1"))
            .and(body_bytes(vec![0x89, b'P', b'N', b'G']))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Key": "avatars/U1/avatar.png"})))
            .expect(1)
            .mount(&server)
            .await;
        let avatar_prefix = format!("{}/storage/v1/object/public/avatars/U1/avatar.png?t=", server.uri());
        Mock::given(method("PUT"))
            .and(path("/auth/v1/user"))
            .respond_with(move |req: &wiremock::Request| {
                let body: Value = serde_json::from_slice(&req.body).unwrap();
                ResponseTemplate::new(200).set_body_json(json!({
                    "id": "U1",
                    "email": "a@b.com",
                    "user_metadata": body["data"].clone()
                }))
            })
            .expect(1)
            .mount(&server)
            .await;

        let client = signed_in_client(&server).await;
        let user = client
            .upload_avatar(vec![0x89, b'P', b'N', b'G'], "image/png")
            .await
            .unwrap();

        let avatar = user.avatar_url(96);
        assert!(avatar.starts_with(&avatar_prefix), "avatar {}", avatar);
    }

    #[tokio::test]
    async fn test_upload_avatar_rejects_large_files() {
        let server = MockServer::start().await;
        Mock::given(path_regex("^/storage/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = signed_in_client(&server).await;
        let err = client
            .upload_avatar(vec![0; MAX_AVATAR_BYTES + 1], "image/png")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::AvatarTooLarge);
    }
}
