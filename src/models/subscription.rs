//! Mirror of a Stripe subscription.

use serde::{Deserialize, Serialize};

/// Subscription stored in Firestore (`subscriptions/{stripe_subscription_id}`).
///
/// Timestamps are RFC3339 strings converted from Stripe's unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    /// Stripe status: trialing, active, past_due, canceled, ...
    pub status: String,
    pub price_id: Option<String>,
    pub quantity: Option<u64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub created: Option<String>,
    pub current_period_start: Option<String>,
    pub current_period_end: Option<String>,
    pub ended_at: Option<String>,
    pub cancel_at: Option<String>,
    pub canceled_at: Option<String>,
    pub trial_start: Option<String>,
    pub trial_end: Option<String>,
}
