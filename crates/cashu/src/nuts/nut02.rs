//! NUT-02: keysets — opaque keyset identifiers and their denomination maps.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::Error;
use crate::nuts::nut01::PublicKey;

/// An opaque keyset identifier, as issued by the mint.
///
/// The spec treats this as opaque; we store it as raw bytes so it can be
/// carried verbatim in both the `cashuA` (hex string) and `cashuB` (raw
/// bytes) token encodings without re-deriving it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(Vec<u8>);

impl Id {
    /// Wrap raw identifier bytes as reported by the mint.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(hex::decode(s).map_err(|e| Error::Hex(e.to_string()))?))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A mint's currency unit, e.g. `"usd"` or `"sat"`. Mint-defined; treated
/// as an opaque, case-sensitive string rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyUnit(String);

impl CurrencyUnit {
    /// The wallet's default unit, per the configuration surface.
    pub fn usd() -> Self {
        Self("usd".to_string())
    }

    /// The underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CurrencyUnit {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CurrencyUnit {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for CurrencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata about a keyset as reported by `GET /v1/keysets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySetInfo {
    /// Opaque keyset id.
    pub id: Id,
    /// Currency unit this keyset signs for.
    pub unit: CurrencyUnit,
    /// Whether the mint is currently minting/swapping against this keyset.
    pub active: bool,
}

/// A keyset's denomination → public key map, as reported by
/// `GET /v1/keys/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys(BTreeMap<Amount, PublicKey>);

impl Keys {
    /// Build from a denomination → public key map.
    pub fn new(keys: BTreeMap<Amount, PublicKey>) -> Self {
        Self(keys)
    }

    /// The public key for an exact denomination, if the keyset has one.
    pub fn amount_key(&self, amount: Amount) -> Option<&PublicKey> {
        self.0.get(&amount)
    }

    /// Iterate denomination/key pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&Amount, &PublicKey)> {
        self.0.iter()
    }
}

impl Serialize for Keys {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (amount, key) in &self.0 {
            map.serialize_entry(&amount.to_u64().to_string(), key)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Keys {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw: BTreeMap<String, PublicKey> = BTreeMap::deserialize(deserializer)?;
        let mut keys = BTreeMap::new();
        for (amount_str, key) in raw {
            let value: u64 = amount_str.parse().map_err(serde::de::Error::custom)?;
            keys.insert(Amount::from_u64(value), key);
        }
        Ok(Self(keys))
    }
}

/// A full keyset: identity plus its denomination map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    /// Opaque keyset id.
    pub id: Id,
    /// Currency unit.
    pub unit: CurrencyUnit,
    /// Denomination → public key map.
    pub keys: Keys,
}
