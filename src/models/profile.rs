//! Entitlement record, one per identity.

use serde::{Deserialize, Serialize};

/// Profile stored in Firestore (`profiles/{id}`).
///
/// `pro_status` only ever moves from false to true; nothing in the billing
/// flow downgrades it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Identity provider user ID (also used as document ID)
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub pro_status: bool,
    /// Last entitlement change (RFC3339)
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Profile {
    /// A fresh profile that has just been granted pro.
    pub fn new_pro(id: impl Into<String>, email: impl Into<String>, now: String) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            pro_status: true,
            updated_at: Some(now),
        }
    }
}
