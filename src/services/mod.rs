// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic and upstream API clients.

pub mod auth_client;
pub mod billing;
pub mod identity_admin;
pub mod profile_api;
pub mod stripe;

pub use auth_client::{AuthClient, AuthError};
pub use billing::{BillingService, EventDisposition};
pub use identity_admin::{IdentityAdmin, LinkType};
pub use profile_api::ProfileApiClient;
pub use stripe::StripeClient;
