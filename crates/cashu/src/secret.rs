//! The unlinkability anchor of a [`crate::nuts::Proof`].

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// A proof's secret: a string unique under the mint, drawn with at least
/// 128 bits of entropy when generated locally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Draw a fresh random secret (32 bytes of entropy, hex-encoded).
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap an existing secret string, e.g. one round-tripped from storage.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The bytes hashed by `hash_to_curve`.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// The underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secrets_are_distinct() {
        let a = Secret::generate();
        let b = Secret::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_bytes().len(), 64); // 32 bytes hex-encoded
    }
}
