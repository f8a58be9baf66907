//! Token codec (component H, spec §4.H, §6.1): the portable proof bundle
//! carrying a mint URL, unit, and proofs, plus its validation helpers.
//!
//! Mirrors `cashu::nuts::nut00::token`'s `cashuA`/`cashuB` split — a
//! base64url JSON envelope for v3 and a base64url CBOR envelope for v4 —
//! trimmed to the two shapes this wallet core must round-trip exactly
//! (spec §8 invariant 3).

use std::collections::HashMap;
use std::fmt;

use bitcoin::base64::engine::{general_purpose, GeneralPurpose};
use bitcoin::base64::{alphabet, Engine as _};
use cashu::{Amount, CurrencyUnit, Id, MintUrl, Proof, Proofs, ProofsMethods};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Tokens in the wild pad inconsistently; accept either on decode.
fn decode_engine() -> GeneralPurpose {
    let config = general_purpose::GeneralPurposeConfig::new()
        .with_decode_padding_mode(bitcoin::base64::engine::DecodePaddingMode::Indifferent);
    GeneralPurpose::new(&alphabet::URL_SAFE, config)
}

/// A decoded token: mint, unit, and the proofs it carries (spec §3
/// "Token (wire form)").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    /// The mint the proofs were issued by.
    pub mint_url: MintUrl,
    /// Currency unit of the proofs.
    pub unit: CurrencyUnit,
    /// The proofs themselves.
    pub proofs: Proofs,
    /// Optional memo carried by v3 envelopes.
    pub memo: Option<String>,
}

// --- v3 (cashuA): JSON envelope -------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenV3Proof {
    amount: Amount,
    id: Id,
    secret: cashu::Secret,
    #[serde(rename = "C")]
    c: cashu::PublicKey,
}

impl From<&Proof> for TokenV3Proof {
    fn from(p: &Proof) -> Self {
        Self {
            amount: p.amount,
            id: p.keyset_id.clone(),
            secret: p.secret.clone(),
            c: p.c,
        }
    }
}

impl From<TokenV3Proof> for Proof {
    fn from(p: TokenV3Proof) -> Self {
        Proof::new(p.amount, p.id, p.secret, p.c)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenV3MintEntry {
    mint: MintUrl,
    proofs: Vec<TokenV3Proof>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenV3Envelope {
    token: Vec<TokenV3MintEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<CurrencyUnit>,
}

// --- v4 (cashuB): CBOR envelope -------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenV4Proof {
    a: Amount,
    s: cashu::Secret,
    #[serde(with = "serde_bytes")]
    c: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenV4KeysetEntry {
    #[serde(rename = "i", with = "serde_bytes")]
    keyset_id: Vec<u8>,
    p: Vec<TokenV4Proof>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenV4Envelope {
    #[serde(rename = "m")]
    mint_url: MintUrl,
    #[serde(rename = "u")]
    unit: CurrencyUnit,
    #[serde(rename = "t")]
    token: Vec<TokenV4KeysetEntry>,
}

/// Minimal byte-vec (de)serialization helper so `ciborium` emits CBOR
/// byte strings for `i`/`c` instead of arrays of integers, matching
/// `cashuB`'s wire shape (spec §6.1).
mod serde_bytes {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        struct BytesVisitor;
        impl<'de> serde::de::Visitor<'de> for BytesVisitor {
            type Value = Vec<u8>;
            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "a byte string")
            }
            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(v.to_vec())
            }
            fn visit_byte_buf<E: serde::de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Ok(v)
            }
        }
        deserializer.deserialize_byte_buf(BytesVisitor)
    }
}

/// Encode `(mint_url, unit, proofs)` as a `cashuB` token (spec §4.H: "the
/// codec emits v4 and accepts both").
pub fn encode(mint_url: &MintUrl, unit: &CurrencyUnit, proofs: &[Proof]) -> Result<String, Error> {
    if proofs.is_empty() {
        return Err(Error::InvalidToken("cannot encode an empty proof list".to_string()));
    }

    let mut by_keyset: HashMap<Id, Vec<TokenV4Proof>> = HashMap::new();
    for proof in proofs {
        by_keyset
            .entry(proof.keyset_id.clone())
            .or_default()
            .push(TokenV4Proof {
                a: proof.amount,
                s: proof.secret.clone(),
                c: proof.c.as_k256().to_sec1_bytes().to_vec(),
            });
    }

    let mut token: Vec<TokenV4KeysetEntry> = by_keyset
        .into_iter()
        .map(|(id, p)| TokenV4KeysetEntry {
            keyset_id: id.as_bytes().to_vec(),
            p,
        })
        .collect();
    // Stable ordering keeps `encode` length-stable across re-runs with
    // the same inputs (spec §8 invariant 3).
    token.sort_by(|a, b| a.keyset_id.cmp(&b.keyset_id));

    let envelope = TokenV4Envelope {
        mint_url: mint_url.clone(),
        unit: unit.clone(),
        token,
    };

    let mut bytes = Vec::new();
    ciborium::into_writer(&envelope, &mut bytes)
        .map_err(|e| Error::InvalidToken(format!("cbor encode: {e}")))?;

    Ok(format!("cashuB{}", general_purpose::URL_SAFE.encode(bytes)))
}

/// Decode either a `cashuA` or `cashuB` token into one proof list plus a
/// single mint URL (spec §4.H: "must accept both v3 ... and v4 ... shapes
/// and normalize to a single proof list").
pub fn decode(token: &str) -> Result<DecodedToken, Error> {
    if let Some(body) = token.strip_prefix("cashuB") {
        decode_v4(body)
    } else if let Some(body) = token.strip_prefix("cashuA") {
        decode_v3(body)
    } else {
        Err(Error::InvalidToken(
            "unknown token version prefix".to_string(),
        ))
    }
}

fn decode_v4(body: &str) -> Result<DecodedToken, Error> {
    let bytes = decode_engine()
        .decode(body)
        .map_err(|e| Error::InvalidToken(format!("invalid base64: {e}")))?;
    let envelope: TokenV4Envelope = ciborium::from_reader(&bytes[..])
        .map_err(|e| Error::InvalidToken(format!("invalid cbor: {e}")))?;

    let mut proofs = Proofs::new();
    for entry in envelope.token {
        let keyset_id = Id::from_bytes(entry.keyset_id);
        for p in entry.p {
            let c = cashu::PublicKey::from_sec1_bytes(&p.c)
                .map_err(|_| Error::InvalidToken("token C is not a valid curve point".to_string()))?;
            proofs.push(Proof::new(p.a, keyset_id.clone(), p.s, c));
        }
    }

    reject_if_empty(&proofs)?;

    Ok(DecodedToken {
        mint_url: envelope.mint_url,
        unit: envelope.unit,
        proofs,
        memo: None,
    })
}

fn decode_v3(body: &str) -> Result<DecodedToken, Error> {
    let bytes = decode_engine()
        .decode(body)
        .map_err(|e| Error::InvalidToken(format!("invalid base64: {e}")))?;
    let envelope: TokenV3Envelope = serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidToken(format!("invalid json: {e}")))?;

    let mut mint_url = None;
    let mut proofs = Proofs::new();
    for entry in envelope.token {
        if mint_url.is_none() {
            mint_url = Some(entry.mint.clone());
        }
        proofs.extend(entry.proofs.into_iter().map(Proof::from));
    }

    reject_if_empty(&proofs)?;

    Ok(DecodedToken {
        mint_url: mint_url.ok_or_else(|| Error::InvalidToken("token carries no mint".to_string()))?,
        unit: envelope.unit.unwrap_or_else(CurrencyUnit::usd),
        proofs,
        memo: envelope.memo,
    })
}

fn reject_if_empty(proofs: &[Proof]) -> Result<(), Error> {
    if proofs.is_empty() {
        Err(Error::InvalidToken("token carries no proofs".to_string()))
    } else {
        Ok(())
    }
}

/// Result of [`validate_token`] (spec §4.H "Validation helpers").
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// `true` iff `errors` is empty.
    pub valid: bool,
    /// Fatal problems (mismatched unit, amount out of bounds, ...).
    pub errors: Vec<String>,
    /// Non-fatal observations (missing unit against an expectation, ...).
    pub warnings: Vec<String>,
    /// Summary info: total amount and proof count.
    pub info: Vec<String>,
}

/// Validate a token string against optional expectations, without
/// mutating any wallet state (spec §4.H).
pub fn validate_token(
    token: &str,
    expected_mint: Option<&MintUrl>,
    expected_unit: Option<&CurrencyUnit>,
    amount_bounds: Option<(Amount, Amount)>,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    let decoded = match decode(token) {
        Ok(d) => d,
        Err(e) => {
            report.errors.push(e.to_string());
            return report;
        }
    };

    let total = match decoded.proofs.total_amount() {
        Ok(t) => t,
        Err(e) => {
            report.errors.push(e.to_string());
            return report;
        }
    };
    report.info.push(format!("amount: {total}"));
    report
        .info
        .push(format!("proofs: {}", decoded.proofs.len()));

    if let Some(expected) = expected_mint {
        if &decoded.mint_url != expected {
            report.errors.push(format!(
                "mint mismatch: token is from {}, expected {}",
                decoded.mint_url, expected
            ));
        }
    }

    // A missing unit against an expectation is only a warning — the
    // codec always produces one, but a hand-authored or third-party
    // token might omit it (spec §4.H). A present-but-different unit is
    // fatal.
    if decoded.unit.as_str().is_empty() {
        if expected_unit.is_some() {
            report
                .warnings
                .push("token carries no unit".to_string());
        }
    } else if let Some(expected) = expected_unit {
        if &decoded.unit != expected {
            report.errors.push(format!(
                "unit mismatch: token is `{}`, expected `{}`",
                decoded.unit, expected
            ));
        }
    }

    if let Some((min, max)) = amount_bounds {
        if total < min || total > max {
            report
                .errors
                .push(format!("amount {total} outside bounds [{min}, {max}]"));
        }
    }

    report.valid = report.errors.is_empty();
    report
}

impl fmt::Display for DecodedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} proofs from {} ({})",
            self.proofs.len(),
            self.mint_url,
            self.unit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashu::SecretKey;

    fn sample_proofs() -> Proofs {
        let id = Id::from_bytes(vec![0x00, 0x9a, 0x1f, 0x29, 0x32, 0x53, 0xe4, 0x1e]);
        vec![
            Proof::new(
                Amount::from_u64(1),
                id.clone(),
                cashu::Secret::generate(),
                SecretKey::generate().public_key(),
            ),
            Proof::new(
                Amount::from_u64(2),
                id,
                cashu::Secret::generate(),
                SecretKey::generate().public_key(),
            ),
        ]
    }

    #[test]
    fn encode_decode_round_trips() {
        let mint_url: MintUrl = "https://mint.example.com".parse().unwrap();
        let unit = CurrencyUnit::from("usd");
        let proofs = sample_proofs();

        let encoded = encode(&mint_url, &unit, &proofs).unwrap();
        assert!(encoded.starts_with("cashuB"));

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.mint_url, mint_url);
        assert_eq!(decoded.unit, unit);

        let mut expected_secrets: Vec<_> = proofs.iter().map(|p| p.secret.to_string()).collect();
        let mut got_secrets: Vec<_> = decoded.proofs.iter().map(|p| p.secret.to_string()).collect();
        expected_secrets.sort();
        got_secrets.sort();
        assert_eq!(expected_secrets, got_secrets);
    }

    #[test]
    fn encode_length_is_stable_across_reruns() {
        let mint_url: MintUrl = "https://mint.example.com".parse().unwrap();
        let unit = CurrencyUnit::from("usd");
        let proofs = sample_proofs();

        let first = encode(&mint_url, &unit, &proofs).unwrap();
        let second = encode(&mint_url, &unit, &proofs).unwrap();
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn empty_proofs_are_rejected() {
        let mint_url: MintUrl = "https://mint.example.com".parse().unwrap();
        let unit = CurrencyUnit::from("usd");
        assert!(encode(&mint_url, &unit, &[]).is_err());
    }

    #[test]
    fn decode_rejects_unknown_prefix() {
        let err = decode("cashuZnonsense").unwrap_err();
        assert!(matches!(err, Error::InvalidToken(_)));
    }

    #[test]
    fn validate_reports_mint_mismatch_as_error() {
        let mint_url: MintUrl = "https://mint.example.com".parse().unwrap();
        let other: MintUrl = "https://other.example.com".parse().unwrap();
        let unit = CurrencyUnit::from("usd");
        let encoded = encode(&mint_url, &unit, &sample_proofs()).unwrap();

        let report = validate_token(&encoded, Some(&other), None, None);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("mint mismatch")));
    }

    #[test]
    fn validate_reports_missing_unit_as_warning_not_error() {
        let mint_url: MintUrl = "https://mint.example.com".parse().unwrap();
        let expected_unit = CurrencyUnit::from("usd");
        let encoded = encode(&mint_url, &CurrencyUnit::from(""), &sample_proofs()).unwrap();

        let report = validate_token(&encoded, None, Some(&expected_unit), None);
        assert!(report.valid, "missing unit must not fail validation");
        assert!(report.warnings.iter().any(|w| w.contains("no unit")));
    }

    #[test]
    fn decode_v3_json_envelope() {
        // A hand-built cashuA token (v3 shape) must decode identically
        // regardless of which encoder produced it.
        let mint_url: MintUrl = "https://mint.example.com".parse().unwrap();
        let id = Id::from_bytes(vec![0u8; 8]);
        let secret = cashu::Secret::generate();
        let c = SecretKey::generate().public_key();

        let envelope = TokenV3Envelope {
            token: vec![TokenV3MintEntry {
                mint: mint_url.clone(),
                proofs: vec![TokenV3Proof {
                    amount: Amount::from_u64(4),
                    id: id.clone(),
                    secret: secret.clone(),
                    c,
                }],
            }],
            memo: Some("thanks".to_string()),
            unit: Some(CurrencyUnit::from("usd")),
        };
        let json = serde_json::to_vec(&envelope).unwrap();
        let token_str = format!("cashuA{}", general_purpose::URL_SAFE.encode(json));

        let decoded = decode(&token_str).unwrap();
        assert_eq!(decoded.mint_url, mint_url);
        assert_eq!(decoded.proofs.len(), 1);
        assert_eq!(decoded.proofs[0].amount, Amount::from_u64(4));
        assert_eq!(decoded.memo.as_deref(), Some("thanks"));
    }
}
