// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod identity;
pub mod order;
pub mod profile;
pub mod subscription;

pub use identity::{AuthChangeEvent, AuthStateChange, Identity, Session};
pub use order::Order;
pub use profile::Profile;
pub use subscription::Subscription;
