// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared input normalization and password rules.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};

/// Canonical form for comparing emails across Stripe and the identity provider.
pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return None;
    }
    Some(email.to_lowercase())
}

/// Trimmed, non-empty user reference (e.g. a checkout `client_reference_id`).
pub fn normalize_user_id(id: Option<&str>) -> Option<String> {
    id.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Characters accepted by the special-character rule.
pub const PASSWORD_SPECIALS: &str = "!@#$%^&*()";

/// A single password strength requirement.
#[derive(Debug, Clone, Copy)]
pub struct PasswordRule {
    pub id: &'static str,
    pub label: &'static str,
    check: fn(&str) -> bool,
}

impl PasswordRule {
    pub fn is_met(&self, password: &str) -> bool {
        (self.check)(password)
    }
}

pub const PASSWORD_RULES: [PasswordRule; 5] = [
    PasswordRule {
        id: "length",
        label: "At least 8 characters",
        check: |p| p.chars().count() >= 8,
    },
    PasswordRule {
        id: "uppercase",
        label: "One uppercase letter",
        check: |p| p.chars().any(|c| c.is_ascii_uppercase()),
    },
    PasswordRule {
        id: "lowercase",
        label: "One lowercase letter",
        check: |p| p.chars().any(|c| c.is_ascii_lowercase()),
    },
    PasswordRule {
        id: "number",
        label: "One number",
        check: |p| p.chars().any(|c| c.is_ascii_digit()),
    },
    PasswordRule {
        id: "special",
        label: "One special character (!@#$%^&*())",
        check: |p| p.chars().any(|c| PASSWORD_SPECIALS.contains(c)),
    },
];

/// Labels of the rules a password fails; empty when it is strong.
pub fn unmet_password_rules(password: &str) -> Vec<&'static str> {
    PASSWORD_RULES
        .iter()
        .filter(|rule| !rule.is_met(password))
        .map(|rule| rule.label)
        .collect()
}

pub fn is_password_strong(password: &str) -> bool {
    PASSWORD_RULES.iter().all(|rule| rule.is_met(password))
}

/// Random throwaway password for accounts created on the purchaser's behalf.
///
/// The purchaser never sees it; they set their own through the recovery link.
pub fn random_password() -> Result<String, ring::error::Unspecified> {
    let mut bytes = [0u8; 24];
    SystemRandom::new().fill(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  A@B.com "), Some("a@b.com".to_string()));
        assert_eq!(normalize_email(""), None);
        assert_eq!(normalize_email("not-an-email"), None);
    }

    #[test]
    fn test_normalize_user_id() {
        assert_eq!(normalize_user_id(Some(" u1 ")), Some("u1".to_string()));
        assert_eq!(normalize_user_id(Some("   ")), None);
        assert_eq!(normalize_user_id(None), None);
    }

    #[test]
    fn test_password_rules() {
        assert!(is_password_strong("Sup3r(secret"));
        assert_eq!(
            unmet_password_rules("short"),
            vec![
                "At least 8 characters",
                "One uppercase letter",
                "One number",
                "One special character (!@#$%^&*())"
            ]
        );
        // '-' is not in the accepted special set
        assert!(!is_password_strong("Abcdefg1-"));
    }

    #[test]
    fn test_random_password_is_unique() {
        let a = random_password().unwrap();
        let b = random_password().unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
