//! NUT-00: proofs and blinded messages.
//!
//! Simplified against the upstream NUT-00 shape: no witness, DLEQ proof or
//! P2PK/HTLC spending-condition fields, since this wallet's data model
//! (spec §3) carries none of them.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::Error;
use crate::nuts::nut01::PublicKey;
use crate::nuts::nut02::Id;
use crate::secret::Secret;

/// A signed, spendable credit issued by the mint.
///
/// Identified by its `secret`; unique within a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// Denomination; canonically a power of two.
    pub amount: Amount,
    #[serde(rename = "id")]
    /// Keyset the signature was issued under.
    pub keyset_id: Id,
    /// The unlinkability anchor.
    pub secret: Secret,
    #[serde(rename = "C")]
    /// Unblinded BDHKE signature.
    pub c: PublicKey,
}

impl Proof {
    /// Construct a proof from its fields.
    pub fn new(amount: Amount, keyset_id: Id, secret: Secret, c: PublicKey) -> Self {
        Self {
            amount,
            keyset_id,
            secret,
            c,
        }
    }

    /// `Y = hash_to_curve(secret)`, the value the mint's check-state
    /// endpoint indexes proofs by.
    pub fn y(&self) -> PublicKey {
        crate::dhke::hash_to_curve(self.secret.as_bytes()).into()
    }
}

impl std::hash::Hash for Proof {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.secret.hash(state);
    }
}

impl PartialOrd for Proof {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Proof {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.amount.cmp(&other.amount)
    }
}

/// A list of proofs, with the summation helpers the selector and store
/// need repeatedly.
pub type Proofs = Vec<Proof>;

/// Convenience operations over a proof list.
pub trait ProofsMethods {
    /// Sum of all amounts. Fails on overflow rather than wrapping.
    fn total_amount(&self) -> Result<Amount, Error>;

    /// The `Y` values of every proof, in order.
    fn ys(&self) -> Vec<PublicKey>;
}

impl ProofsMethods for [Proof] {
    fn total_amount(&self) -> Result<Amount, Error> {
        Amount::try_sum(self.iter().map(|p| p.amount))
    }

    fn ys(&self) -> Vec<PublicKey> {
        self.iter().map(Proof::y).collect()
    }
}

/// A transient blinded output: the message sent to the mint plus the
/// private state needed to unblind the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlindedMessage {
    /// Denomination.
    pub amount: Amount,
    #[serde(rename = "id")]
    /// Target keyset.
    pub keyset_id: Id,
    #[serde(rename = "B_")]
    /// The blinded point `B_ = Y + r*G`.
    pub blinded_secret: PublicKey,
}

/// The mint's blind signature over a [`BlindedMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlindSignature {
    /// Denomination (mirrors the corresponding output).
    pub amount: Amount,
    #[serde(rename = "id")]
    /// Keyset that signed.
    pub keyset_id: Id,
    #[serde(rename = "C_")]
    /// The blinded signature `C_ = a*B_`.
    pub c: PublicKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nuts::nut01::SecretKey;

    #[test]
    fn proof_hash_depends_only_on_secret() {
        use std::collections::HashSet;

        let id = Id::from_bytes(vec![0u8; 8]);
        let c = SecretKey::generate().public_key();
        let secret = Secret::generate();

        let p1 = Proof::new(Amount::from_u64(1), id.clone(), secret.clone(), c);
        let p2 = Proof::new(Amount::from_u64(2), id, secret, c);

        let mut set = HashSet::new();
        set.insert(p1);
        assert!(!set.insert(p2), "same secret must collide in a HashSet");
    }

    #[test]
    fn total_amount_sums_proofs() {
        let id = Id::from_bytes(vec![0u8; 8]);
        let c = SecretKey::generate().public_key();
        let proofs: Proofs = vec![1u64, 2, 4]
            .into_iter()
            .map(|a| Proof::new(Amount::from_u64(a), id.clone(), Secret::generate(), c))
            .collect();
        assert_eq!(proofs.total_amount().unwrap(), Amount::from_u64(7));
    }
}
