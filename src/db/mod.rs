//! Database layer (Firestore, with an in-memory backend for tests and local dev).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

/// Collection names as constants.
pub mod collections {
    pub const PROFILES: &str = "profiles";
    pub const ORDERS: &str = "orders";
    pub const SUBSCRIPTIONS: &str = "subscriptions";
}
