// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Profiles (pro entitlement, keyed by identity ID)
//! - Orders (one per completed checkout session)
//! - Subscriptions (mirrored Stripe subscription state)

use crate::db::{collections, MemoryStore};
use crate::error::AppError;
use crate::models::{Order, Profile, Subscription};
use crate::time_utils::now_rfc3339;
use std::sync::Arc;

#[derive(Clone)]
enum Backend {
    Firestore(firestore::FirestoreDb),
    Memory(Arc<MemoryStore>),
}

/// Result of granting pro status to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProGrant {
    /// An existing profile was flipped (or kept) to pro.
    Updated,
    /// A new profile row was created with pro status.
    Created,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    backend: Backend,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore (Emulator)");

        Ok(Self {
            backend: Backend::Firestore(client),
        })
    }

    /// Create a store backed by process memory (tests and local dev).
    pub fn new_in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(MemoryStore::new())),
        }
    }

    /// Access the in-memory tables, if this is a memory-backed store.
    pub fn memory(&self) -> Option<&MemoryStore> {
        match &self.backend {
            Backend::Memory(store) => Some(store),
            Backend::Firestore(_) => None,
        }
    }

    // ─── Profile Operations ──────────────────────────────────────

    /// Get a profile by identity ID.
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.get_profile(user_id)),
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::PROFILES)
                .obj()
                .one(user_id)
                .await
                .map_err(|e| AppError::Database(e.to_string())),
        }
    }

    /// Create or replace a profile.
    pub async fn put_profile(&self, profile: &Profile) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(store) => {
                store.put_profile(profile);
                Ok(())
            }
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::PROFILES)
                    .document_id(&profile.id)
                    .object(profile)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
        }
    }

    /// Set `pro_status = true` for a user, creating the profile if needed.
    ///
    /// A missing profile can only be created when the email is known.
    pub async fn grant_pro(&self, user_id: &str, email: Option<&str>) -> Result<ProGrant, AppError> {
        let now = now_rfc3339();

        if let Some(mut profile) = self.get_profile(user_id).await? {
            profile.pro_status = true;
            profile.updated_at = Some(now);
            self.put_profile(&profile).await?;
            return Ok(ProGrant::Updated);
        }

        let email = email.ok_or_else(|| {
            AppError::BadRequest(format!(
                "Cannot create profile for user {} without an email",
                user_id
            ))
        })?;

        self.put_profile(&Profile::new_pro(user_id, email, now))
            .await?;
        Ok(ProGrant::Created)
    }

    // ─── Order Operations ────────────────────────────────────────

    /// Insert a new order. Fails with `AppError::Conflict` if the ID exists.
    pub async fn insert_order(&self, order: &Order) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(store) => store.insert_order(order),
            Backend::Firestore(client) => {
                let result: Result<Order, _> = client
                    .fluent()
                    .insert()
                    .into(collections::ORDERS)
                    .document_id(&order.id)
                    .object(order)
                    .execute()
                    .await;

                match result {
                    Ok(_) => Ok(()),
                    Err(firestore::errors::FirestoreError::DataConflictError(e)) => Err(
                        AppError::Conflict(format!("order {} already exists: {}", order.id, e)),
                    ),
                    Err(e) => Err(AppError::Database(e.to_string())),
                }
            }
        }
    }

    /// Get an order by checkout session ID.
    pub async fn get_order(&self, order_id: &str) -> Result<Option<Order>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.get_order(order_id)),
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::ORDERS)
                .obj()
                .one(order_id)
                .await
                .map_err(|e| AppError::Database(e.to_string())),
        }
    }

    /// All orders belonging to a user.
    pub async fn get_orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.orders_for_user(user_id)),
            Backend::Firestore(client) => {
                let user_id = user_id.to_string();
                client
                    .fluent()
                    .select()
                    .from(collections::ORDERS)
                    .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
                    .obj()
                    .query()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))
            }
        }
    }

    // ─── Subscription Operations ─────────────────────────────────

    /// Create or replace a subscription mirror.
    pub async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), AppError> {
        match &self.backend {
            Backend::Memory(store) => {
                store.put_subscription(subscription);
                Ok(())
            }
            Backend::Firestore(client) => {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::SUBSCRIPTIONS)
                    .document_id(&subscription.id)
                    .object(subscription)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok(())
            }
        }
    }

    /// Get a subscription by Stripe subscription ID.
    pub async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.get_subscription(subscription_id)),
            Backend::Firestore(client) => client
                .fluent()
                .select()
                .by_id_in(collections::SUBSCRIPTIONS)
                .obj()
                .one(subscription_id)
                .await
                .map_err(|e| AppError::Database(e.to_string())),
        }
    }
}
