//! Identity provider user, session and auth event types.
//!
//! Field names follow the Supabase GoTrue JSON so these deserialize straight
//! from its REST responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Seconds before `expires_at` at which a session counts as expired.
const EXPIRY_MARGIN_SECS: i64 = 10;

/// User record owned by the identity provider (read-only copy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form user metadata (full_name, nickname, avatar_url, ...)
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
    /// Provider-controlled metadata (provider tag, ...)
    #[serde(default)]
    pub app_metadata: Map<String, Value>,
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Identity {
    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// OAuth provider tag from app metadata ("email", "google", ...).
    pub fn provider(&self) -> Option<&str> {
        self.app_metadata.get("provider").and_then(Value::as_str)
    }

    /// Human-readable sign-in method.
    pub fn provider_label(&self) -> &'static str {
        match self.provider() {
            Some("google") => "Google",
            _ => "Email & Password",
        }
    }

    pub fn full_name(&self) -> Option<&str> {
        self.metadata_str("full_name")
    }

    /// Nickname from metadata, falling back to the email local part.
    pub fn nickname(&self) -> Option<&str> {
        self.metadata_str("nickname").or_else(|| {
            self.email
                .as_deref()
                .and_then(|e| e.split('@').next())
                .filter(|s| !s.is_empty())
        })
    }

    /// Avatar URL: explicit metadata first, then Gravatar.
    pub fn avatar_url(&self, size: u32) -> String {
        if let Some(url) = self.metadata_str("avatar_url") {
            return url.to_string();
        }
        gravatar_url(self.email.as_deref(), size)
    }
}

/// Gravatar URL for an email; the mystery-person image when there is none.
pub fn gravatar_url(email: Option<&str>, size: u32) -> String {
    match email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty()) {
        Some(email) => {
            let hash = hex::encode(Sha256::digest(email.as_bytes()));
            format!("https://www.gravatar.com/avatar/{hash}?s={size}&d=mp")
        }
        None => format!("https://www.gravatar.com/avatar/?s={size}&d=mp"),
    }
}

/// Authenticated session: token pair plus the user it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds as issued
    #[serde(default)]
    pub expires_in: i64,
    /// Absolute expiry (unix seconds)
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub refresh_token: String,
    pub user: Identity,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Fill `expires_at` from `expires_in` when the provider omitted it.
    pub fn with_expiry_from(mut self, now_secs: i64) -> Self {
        if self.expires_at.is_none() && self.expires_in > 0 {
            self.expires_at = Some(now_secs + self.expires_in);
        }
        self
    }

    /// True when the access token is expired (or about to be) at `now_secs`.
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|at| at - EXPIRY_MARGIN_SECS <= now_secs)
    }
}

/// Session-change notifications emitted by the identity provider client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

/// An auth event together with the session it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthStateChange {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity(value: Value) -> Identity {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_identity_from_gotrue_json() {
        let user = identity(json!({
            "id": "8d0f6c1e",
            "aud": "authenticated",
            "email": "Ada@Example.com",
            "app_metadata": {"provider": "google", "providers": ["google"]},
            "user_metadata": {"full_name": "Ada Lovelace"},
            "created_at": "2025-01-01T00:00:00Z"
        }));

        assert_eq!(user.provider_label(), "Google");
        assert_eq!(user.full_name(), Some("Ada Lovelace"));
        assert_eq!(user.nickname(), Some("Ada"));
    }

    #[test]
    fn test_avatar_prefers_metadata() {
        let user = identity(json!({
            "id": "u1",
            "email": "a@b.com",
            "user_metadata": {"avatar_url": "https://cdn.example.com/a.png"}
        }));
        assert_eq!(user.avatar_url(80), "https://cdn.example.com/a.png");
    }

    #[test]
    fn test_gravatar_normalizes_email() {
        let a = gravatar_url(Some("  A@B.com "), 40);
        let b = gravatar_url(Some("a@b.com"), 40);
        assert_eq!(a, b);
        assert!(a.starts_with("https://www.gravatar.com/avatar/"));
        assert!(a.ends_with("?s=40&d=mp"));

        assert_eq!(
            gravatar_url(None, 40),
            "https://www.gravatar.com/avatar/?s=40&d=mp"
        );
    }

    #[test]
    fn test_session_expiry() {
        let session: Session = serde_json::from_value(json!({
            "access_token": "at",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rt",
            "user": {"id": "u1"}
        }))
        .unwrap();

        let session = session.with_expiry_from(1_000);
        assert_eq!(session.expires_at, Some(4_600));
        assert!(!session.is_expired_at(1_000));
        assert!(session.is_expired_at(4_595));
    }

    #[test]
    fn test_event_names() {
        let event: AuthChangeEvent = serde_json::from_value(json!("USER_UPDATED")).unwrap();
        assert_eq!(event, AuthChangeEvent::UserUpdated);
    }
}
