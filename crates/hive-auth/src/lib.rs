//! Boundary authentication.
//!
//! Spec §1 Non-goals: "implementing authentication beyond a header-key
//! check at the boundary." This crate is deliberately thin compared to the
//! teacher's full JWT capability-token stack (`toka-auth`): there is no
//! session state, no claims, no expiry — just a constant-time comparison
//! of a presented key against the configured one.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use thiserror::Error;

/// Errors raised while validating a boundary key.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The presented key did not match the configured one.
    #[error("invalid api key")]
    InvalidKey,
    /// No key was configured, so the boundary is closed to all callers.
    #[error("no api key configured")]
    NotConfigured,
}

/// Validates a presented API key against a boundary secret.
#[async_trait]
pub trait KeyValidator: Send + Sync {
    /// Validates `presented`, returning `Ok(())` on success.
    async fn validate(&self, presented: &str) -> Result<(), AuthError>;
}

/// A [`KeyValidator`] backed by a single configured key, compared in
/// constant time to avoid leaking match-length via timing.
pub struct StaticKeyValidator {
    expected: Option<Secret<String>>,
}

impl StaticKeyValidator {
    /// Builds a validator that accepts only `expected`. Passing `None`
    /// produces a validator that rejects every request.
    pub fn new(expected: Option<String>) -> Self {
        StaticKeyValidator {
            expected: expected.map(Secret::new),
        }
    }
}

#[async_trait]
impl KeyValidator for StaticKeyValidator {
    async fn validate(&self, presented: &str) -> Result<(), AuthError> {
        let expected = self.expected.as_ref().ok_or(AuthError::NotConfigured)?;
        if constant_time_eq(expected.expose_secret().as_bytes(), presented.as_bytes()) {
            Ok(())
        } else {
            Err(AuthError::InvalidKey)
        }
    }
}

/// Constant-time byte comparison: always scans both slices in full so the
/// running time does not depend on where the first mismatch occurs.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_matching_key() {
        let v = StaticKeyValidator::new(Some("secret-key".to_string()));
        assert!(v.validate("secret-key").await.is_ok());
    }

    #[tokio::test]
    async fn rejects_wrong_key() {
        let v = StaticKeyValidator::new(Some("secret-key".to_string()));
        assert!(matches!(
            v.validate("wrong").await,
            Err(AuthError::InvalidKey)
        ));
    }

    #[tokio::test]
    async fn rejects_when_unconfigured() {
        let v = StaticKeyValidator::new(None);
        assert!(matches!(
            v.validate("anything").await,
            Err(AuthError::NotConfigured)
        ));
    }
}
