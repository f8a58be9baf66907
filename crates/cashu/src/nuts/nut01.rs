//! NUT-01: mint public keys, wrapped as hex-serialized secp256k1 points.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A compressed secp256k1 public key, serialized as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey(k256::PublicKey);

impl PublicKey {
    /// Parse from compressed or uncompressed SEC1 bytes.
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, Error> {
        Ok(Self(
            k256::PublicKey::from_sec1_bytes(bytes).map_err(|_| Error::InvalidPoint)?,
        ))
    }

    /// Parse from a hex-encoded compressed point.
    pub fn from_hex(hex_str: &str) -> Result<Self, Error> {
        let bytes = hex::decode(hex_str).map_err(|e| Error::Hex(e.to_string()))?;
        Self::from_sec1_bytes(&bytes)
    }

    /// Compressed SEC1 encoding, hex-encoded.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_sec1_bytes())
    }

    /// The underlying curve point.
    pub fn as_k256(&self) -> &k256::PublicKey {
        &self.0
    }
}

impl From<k256::PublicKey> for PublicKey {
    fn from(value: k256::PublicKey) -> Self {
        Self(value)
    }
}

impl From<PublicKey> for k256::PublicKey {
    fn from(value: PublicKey) -> Self {
        value.0
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A secp256k1 secret scalar, used as a blinding factor `r` or, in tests,
/// as a stand-in mint keypair.
#[derive(Clone)]
pub struct SecretKey(k256::SecretKey);

impl SecretKey {
    /// Draw a cryptographically random scalar.
    pub fn generate() -> Self {
        Self(k256::SecretKey::random(&mut rand::thread_rng()))
    }

    /// Parse from a hex-encoded scalar.
    pub fn from_hex(hex_str: &str) -> Result<Self, Error> {
        let bytes = hex::decode(hex_str).map_err(|e| Error::Hex(e.to_string()))?;
        Ok(Self(
            k256::SecretKey::from_slice(&bytes).map_err(|_| Error::InvalidPoint)?,
        ))
    }

    /// Hex-encoded scalar bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.public_key())
    }

    /// The underlying scalar.
    pub fn as_k256(&self) -> &k256::SecretKey {
        &self.0
    }
}

impl From<k256::SecretKey> for SecretKey {
    fn from(value: k256::SecretKey) -> Self {
        Self(value)
    }
}

impl From<SecretKey> for k256::SecretKey {
    fn from(value: SecretKey) -> Self {
        value.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey").field(&"<redacted>").finish()
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bytes() == other.0.to_bytes()
    }
}

impl Eq for SecretKey {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_hex_round_trips() {
        let sk = SecretKey::generate();
        let pk = sk.public_key();
        let decoded = PublicKey::from_hex(&pk.to_hex()).unwrap();
        assert_eq!(pk, decoded);
    }
}
