// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Billing reconciliation: applies verified Stripe events to the store.
//!
//! Every step is independent. A failed lookup, insert or update is logged
//! and the remaining steps still run; nothing here fails the webhook
//! acknowledgement. Order insert and profile upsert are separate writes, so
//! a redelivered checkout still converges the profile after its order insert
//! is rejected as a duplicate.

use crate::db::FirestoreDb;
use crate::models::{Order, Subscription};
use crate::services::identity_admin::IdentityAdmin;
use crate::services::stripe::{
    CheckoutSession, Charge, StripeClient, StripeEvent, StripeSubscription,
    CHARGE_SUCCEEDED, CHECKOUT_SESSION_COMPLETED, SUBSCRIPTION_CREATED, SUBSCRIPTION_DELETED,
    SUBSCRIPTION_UPDATED,
};
use crate::time_utils::unix_to_rfc3339;
use crate::validation::{normalize_user_id, random_password};
use serde::de::DeserializeOwned;

/// Whether an event type is one we reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    Handled,
    Ignored,
}

/// Reconciles payment events into profiles, orders and subscriptions.
#[derive(Clone)]
pub struct BillingService {
    db: FirestoreDb,
    identity: IdentityAdmin,
    stripe: StripeClient,
    recovery_redirect: String,
}

impl BillingService {
    pub fn new(
        db: FirestoreDb,
        identity: IdentityAdmin,
        stripe: StripeClient,
        recovery_redirect: impl Into<String>,
    ) -> Self {
        Self {
            db,
            identity,
            stripe,
            recovery_redirect: recovery_redirect.into(),
        }
    }

    /// Apply one verified event.
    pub async fn handle_event(&self, event: &StripeEvent) -> EventDisposition {
        match event.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                if let Some(session) = parse_object::<CheckoutSession>(event) {
                    self.checkout_completed(&session).await;
                }
            }
            CHARGE_SUCCEEDED => {
                if let Some(charge) = parse_object::<Charge>(event) {
                    self.charge_succeeded(&charge).await;
                }
            }
            SUBSCRIPTION_CREATED | SUBSCRIPTION_UPDATED | SUBSCRIPTION_DELETED => {
                if let Some(subscription) = parse_object::<StripeSubscription>(event) {
                    self.subscription_changed(&subscription).await;
                }
            }
            other => {
                tracing::info!(event_id = %event.id, event_type = %other, "Unhandled event type");
                return EventDisposition::Ignored;
            }
        }
        EventDisposition::Handled
    }

    async fn checkout_completed(&self, session: &CheckoutSession) {
        let email = session.email().map(str::trim).filter(|e| !e.is_empty());

        let user_id = match normalize_user_id(session.client_reference_id.as_deref()) {
            Some(id) => Some(id),
            None => match email {
                Some(email) => self.find_or_create_user(email).await,
                None => {
                    tracing::error!(
                        session_id = %session.id,
                        "Checkout has neither client reference nor email"
                    );
                    None
                }
            },
        };

        let Some(user_id) = user_id else {
            tracing::error!(session_id = %session.id, "Could not resolve user for checkout");
            return;
        };

        let order = Order {
            id: session.id.clone(),
            user_id: user_id.clone(),
            amount_total: session.amount_total,
            currency: session.currency.clone(),
            payment_status: session.payment_status.clone(),
            metadata: session.metadata.clone().unwrap_or_default(),
        };

        match self.db.insert_order(&order).await {
            Ok(()) => tracing::info!(
                session_id = %session.id,
                user_id = %user_id,
                payment_status = %order.payment_status,
                "Order recorded"
            ),
            Err(e) if e.is_conflict() => {
                tracing::info!(session_id = %session.id, "Order already recorded, skipping insert")
            }
            Err(e) => tracing::error!(
                session_id = %session.id,
                error = %e,
                "Failed to insert order"
            ),
        }

        if !session.is_paid() {
            tracing::info!(
                session_id = %session.id,
                payment_status = %session.payment_status,
                "Checkout not paid, leaving pro status unchanged"
            );
            return;
        }

        self.grant_pro(&user_id, email).await;
    }

    async fn charge_succeeded(&self, charge: &Charge) {
        let Some(email) = charge
            .billing_details
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
        else {
            tracing::warn!(charge_id = %charge.id, "Charge has no billing email");
            return;
        };

        match self.identity.find_user_by_email(email).await {
            Ok(Some(user)) => self.grant_pro(&user.id, Some(email)).await,
            Ok(None) => {
                tracing::warn!(charge_id = %charge.id, "No account for charge billing email")
            }
            Err(e) => tracing::error!(
                charge_id = %charge.id,
                error = %e,
                "Failed to look up user for charge"
            ),
        }
    }

    async fn subscription_changed(&self, subscription: &StripeSubscription) {
        let customer_id = subscription.customer.id();

        let customer = match self.stripe.get_customer(customer_id).await {
            Ok(customer) => customer,
            Err(e) => {
                tracing::error!(
                    subscription_id = %subscription.id,
                    customer_id = %customer_id,
                    error = %e,
                    "Failed to retrieve customer"
                );
                return;
            }
        };

        let Some(user_id) = customer.user_id() else {
            tracing::warn!(
                subscription_id = %subscription.id,
                customer_id = %customer_id,
                "Customer has no user reference"
            );
            return;
        };

        let record = subscription_record(subscription, user_id);
        match self.db.upsert_subscription(&record).await {
            Ok(()) => tracing::info!(
                subscription_id = %record.id,
                user_id = %user_id,
                status = %record.status,
                "Subscription mirrored"
            ),
            Err(e) => tracing::error!(
                subscription_id = %record.id,
                error = %e,
                "Failed to upsert subscription"
            ),
        }
    }

    /// Existing account for `email`, or a new one with a random password
    /// and a recovery email so the purchaser can set their own.
    async fn find_or_create_user(&self, email: &str) -> Option<String> {
        match self.identity.find_user_by_email(email).await {
            Ok(Some(user)) => return Some(user.id),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Failed to look up user by email");
                return None;
            }
        }

        let password = match random_password() {
            Ok(password) => password,
            Err(_) => {
                tracing::error!("Failed to generate password for new account");
                return None;
            }
        };

        let user = match self.identity.create_user(email, &password).await {
            Ok(user) => user,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create account for purchaser");
                return None;
            }
        };
        tracing::info!(user_id = %user.id, "Created account for purchaser");

        if let Err(e) = self
            .identity
            .send_recovery_email(email, &self.recovery_redirect)
            .await
        {
            tracing::error!(user_id = %user.id, error = %e, "Failed to send recovery email");
        }

        Some(user.id)
    }

    async fn grant_pro(&self, user_id: &str, email: Option<&str>) {
        match self.db.grant_pro(user_id, email).await {
            Ok(outcome) => tracing::info!(user_id = %user_id, ?outcome, "Pro status granted"),
            Err(e) => tracing::error!(user_id = %user_id, error = %e, "Failed to grant pro status"),
        }
    }
}

fn parse_object<T: DeserializeOwned>(event: &StripeEvent) -> Option<T> {
    match event.object() {
        Ok(object) => Some(object),
        Err(e) => {
            tracing::error!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "Failed to parse event object"
            );
            None
        }
    }
}

/// Store shape of a Stripe subscription.
fn subscription_record(subscription: &StripeSubscription, user_id: &str) -> Subscription {
    let ts = |secs: Option<i64>| secs.and_then(unix_to_rfc3339);

    Subscription {
        id: subscription.id.clone(),
        user_id: user_id.to_string(),
        status: subscription.status.clone(),
        price_id: subscription.price_id().map(str::to_string),
        quantity: subscription.quantity(),
        cancel_at_period_end: subscription.cancel_at_period_end,
        created: ts(subscription.created),
        current_period_start: ts(subscription.period_start()),
        current_period_end: ts(subscription.period_end()),
        ended_at: ts(subscription.ended_at),
        cancel_at: ts(subscription.cancel_at),
        canceled_at: ts(subscription.canceled_at),
        trial_start: ts(subscription.trial_start),
        trial_end: ts(subscription.trial_end),
    }
}
