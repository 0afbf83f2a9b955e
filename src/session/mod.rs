// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client session manager.
//!
//! A [`SessionManager`] is an explicit context object shared by every view
//! that needs to know who is signed in and whether they are pro. It mirrors
//! the identity provider's session and re-reads the entitlement row whenever
//! that session changes.
//!
//! Entitlement lookups fail closed: any error leaves `pro_status = false`
//! and is only logged, so `loading` always settles.

pub mod provider;

pub use provider::{IdentityProvider, ProfileSource};

use crate::models::{AuthChangeEvent, Identity, Session};
use crate::services::auth_client::AuthError;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Reactive session state observed by views.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub session: Option<Session>,
    pub identity: Option<Identity>,
    pub pro_status: bool,
    /// True until the first session/profile resolution completes.
    pub loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session: None,
            identity: None,
            pro_status: false,
            loading: true,
        }
    }
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }
}

/// Session context shared across views.
pub struct SessionManager<I, P> {
    provider: Arc<I>,
    profiles: Arc<P>,
    state: watch::Sender<SessionState>,
}

impl<I: IdentityProvider, P: ProfileSource> SessionManager<I, P> {
    pub fn new(provider: Arc<I>, profiles: Arc<P>) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::default());
        Arc::new(Self {
            provider,
            profiles,
            state,
        })
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Observe state changes.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Resolve the initial session and entitlement, then clear `loading`.
    pub async fn initialize(&self) {
        self.refresh().await;
        self.state.send_modify(|s| s.loading = false);
    }

    /// Re-run the fetch-session-then-fetch-profile sequence.
    pub async fn refresh(&self) {
        match self.provider.current_session().await {
            Ok(session) => self.apply_session(session).await,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to get session, treating as signed out");
                self.clear();
            }
        }
    }

    /// Sign out with the provider, then reset local state regardless of the
    /// outcome. The provider error, if any, is returned for display.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = self.provider.sign_out().await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Provider sign-out failed, clearing local session anyway");
        }
        self.clear();
        result
    }

    /// Register the provider event listener.
    ///
    /// The listener runs until the returned handle is disposed or dropped.
    /// It holds only a weak reference, so it also stops once the manager is gone.
    pub fn listen(self: &Arc<Self>) -> ListenerHandle {
        let events = self.provider.subscribe();
        let manager = Arc::downgrade(self);
        let task = tokio::spawn(run_listener(manager, events));
        ListenerHandle { task: Some(task) }
    }

    async fn apply_session(&self, session: Option<Session>) {
        let identity = session.as_ref().map(|s| s.user.clone());
        self.state.send_modify(|s| {
            // Never show the previous user's entitlement for a new identity.
            if s.identity.as_ref().map(|i| &i.id) != identity.as_ref().map(|i| &i.id) {
                s.pro_status = false;
            }
            s.session = session.clone();
            s.identity = identity;
        });

        let Some(session) = session else {
            self.state.send_modify(|s| s.pro_status = false);
            return;
        };

        let pro_status = self.resolve_pro_status(&session).await;
        let user_id = session.user.id;

        // A newer event may have switched users while the lookup was in flight.
        self.state.send_modify(|s| {
            if s.identity.as_ref().map(|i| i.id.as_str()) == Some(user_id.as_str()) {
                s.pro_status = pro_status;
            }
        });
    }

    async fn resolve_pro_status(&self, session: &Session) -> bool {
        match self.profiles.fetch_profile(session).await {
            Ok(Some(profile)) => profile.pro_status,
            Ok(None) => false,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    user_id = %session.user.id,
                    "Error fetching profile, defaulting to non-pro"
                );
                false
            }
        }
    }

    fn clear(&self) {
        self.state.send_modify(|s| {
            s.session = None;
            s.identity = None;
            s.pro_status = false;
        });
    }
}

async fn run_listener<I: IdentityProvider, P: ProfileSource>(
    manager: Weak<SessionManager<I, P>>,
    mut events: broadcast::Receiver<crate::models::AuthStateChange>,
) {
    loop {
        match events.recv().await {
            Ok(change) => {
                // Metadata edits don't change entitlement; refetching here
                // would loop with views that update metadata.
                if change.event == AuthChangeEvent::UserUpdated {
                    continue;
                }
                let Some(this) = manager.upgrade() else {
                    break;
                };
                this.apply_session(change.session).await;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Session listener lagged, resyncing");
                let Some(this) = manager.upgrade() else {
                    break;
                };
                this.refresh().await;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::debug!("Session listener stopped");
}

/// Disposer for a registered session listener.
pub struct ListenerHandle {
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    /// Stop listening.
    pub fn dispose(mut self) {
        self.abort();
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.abort();
    }
}
