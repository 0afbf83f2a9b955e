// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory store with the same row semantics as the Firestore collections.

use crate::error::AppError;
use crate::models::{Order, Profile, Subscription};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Process-local tables keyed by document ID.
#[derive(Default)]
pub struct MemoryStore {
    profiles: DashMap<String, Profile>,
    orders: DashMap<String, Order>,
    subscriptions: DashMap<String, Subscription>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_profile(&self, id: &str) -> Option<Profile> {
        self.profiles.get(id).map(|p| p.value().clone())
    }

    pub fn put_profile(&self, profile: &Profile) {
        self.profiles.insert(profile.id.clone(), profile.clone());
    }

    /// Insert an order, rejecting a duplicate ID like a primary key would.
    pub fn insert_order(&self, order: &Order) -> Result<(), AppError> {
        match self.orders.entry(order.id.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "order {} already exists",
                order.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(())
            }
        }
    }

    pub fn get_order(&self, id: &str) -> Option<Order> {
        self.orders.get(id).map(|o| o.value().clone())
    }

    pub fn orders_for_user(&self, user_id: &str) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .map(|o| o.value().clone())
            .collect();
        orders.sort_by(|a, b| a.id.cmp(&b.id));
        orders
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn put_subscription(&self, subscription: &Subscription) {
        self.subscriptions
            .insert(subscription.id.clone(), subscription.clone());
    }

    pub fn get_subscription(&self, id: &str) -> Option<Subscription> {
        self.subscriptions.get(id).map(|s| s.value().clone())
    }
}
