//! Administrative credential check
//!
//! A single (username, password) row guards the administrative surface.
//! Only a SHA-256 digest of the password is persisted.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stored administrative credential
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Username as configured
    pub username: String,

    /// SHA-256 of the password
    password_digest: [u8; 32],
}

impl Credential {
    /// Build from a plaintext password
    pub fn new(username: impl Into<String>, password: &str) -> Self {
        Self {
            username: username.into(),
            password_digest: digest(password),
        }
    }

    /// Username is compared case-insensitively, password exactly
    pub fn matches(&self, username: &str, password: &str) -> bool {
        self.username.to_lowercase() == username.trim().to_lowercase()
            && constant_time_eq(&self.password_digest, &digest(password))
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn digest(password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
