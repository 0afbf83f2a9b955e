// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Upstream seams for the session manager.

use crate::db::FirestoreDb;
use crate::error::AppError;
use crate::models::{AuthStateChange, Profile, Session};
use crate::services::auth_client::{AuthClient, AuthError};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Authoritative source of the current session and its change events.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Current session, if any.
    async fn current_session(&self) -> Result<Option<Session>, AuthError>;

    /// Register for session-change notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange>;

    /// End the session with the provider.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Where the entitlement row for a session's user is read from.
///
/// `Ok(None)` means the row does not exist, which is not an error.
#[async_trait]
pub trait ProfileSource: Send + Sync + 'static {
    async fn fetch_profile(&self, session: &Session) -> Result<Option<Profile>, AppError>;
}

#[async_trait]
impl IdentityProvider for AuthClient {
    async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        AuthClient::current_session(self).await
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthStateChange> {
        AuthClient::subscribe(self)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        AuthClient::sign_out(self).await
    }
}

#[async_trait]
impl ProfileSource for FirestoreDb {
    async fn fetch_profile(&self, session: &Session) -> Result<Option<Profile>, AppError> {
        self.get_profile(&session.user.id).await
    }
}
