//! Completed checkout records.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Order stored in Firestore (`orders/{checkout_session_id}`).
///
/// Written once per checkout session; a second insert with the same ID is
/// rejected by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Stripe checkout session ID
    pub id: String,
    pub user_id: String,
    /// Amount in the smallest currency unit
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    /// "paid", "unpaid" or "no_payment_required"
    pub payment_status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Order {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }
}
