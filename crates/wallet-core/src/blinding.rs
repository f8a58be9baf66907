//! Blinding engine (component B, spec §4.B): decomposes an amount into
//! power-of-two denominations and produces blinded outputs, retaining the
//! private state needed to unblind the mint's response.

use cashu::dhke::{blind_message, construct_proofs};
use cashu::{Amount, BlindSignature, BlindedMessage, Id, Keys, Proofs, Secret, SecretKey};

use crate::error::Error;

/// The private state retained per blinded output: the secret the mint
/// will sign over and the blinding factor needed to unblind its
/// response (spec §3 "BlindedOutput").
#[derive(Debug, Clone)]
pub struct PendingOutput {
    /// Denomination of this output.
    pub amount: Amount,
    /// Keyset the output targets.
    pub keyset_id: Id,
    /// The secret committed to by `hash_to_curve`.
    pub secret: Secret,
    /// The blinding factor `r`.
    pub blinding_factor: SecretKey,
}

/// A batch of blinded outputs plus the private state to unblind them.
#[derive(Debug, Clone, Default)]
pub struct BlindedBatch {
    /// Wire-ready blinded messages, in the order they must be sent.
    pub outputs: Vec<BlindedMessage>,
    /// Private state, index-aligned with `outputs`.
    pub pending: Vec<PendingOutput>,
}

impl BlindedBatch {
    /// Number of outputs.
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// `true` if there are no outputs.
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Concatenate with another batch, preserving relative order.
    pub fn extend(&mut self, other: BlindedBatch) {
        self.outputs.extend(other.outputs);
        self.pending.extend(other.pending);
    }
}

/// Decompose `amount` into its greedy power-of-two buckets and blind one
/// output per bucket against `keyset_id` (spec §4.B).
///
/// Fails with [`Error::UnknownKeyset`] (reported as `UnknownDenomination`
/// upstream) if `keys` has no public key for a required denomination —
/// the mint cannot sign that output regardless of what we send.
pub fn blind(amount: Amount, keyset_id: &Id, keys: &Keys) -> Result<BlindedBatch, Error> {
    let mut batch = BlindedBatch::default();

    for denomination in amount.split() {
        if keys.amount_key(denomination).is_none() {
            return Err(Error::BlindingFailure(format!(
                "no key for denomination {denomination}"
            )));
        }

        let secret = Secret::generate();
        let (blinded_secret, blinding_factor) = blind_message(secret.as_bytes(), None)
            .map_err(|e| Error::BlindingFailure(e.to_string()))?;

        batch.outputs.push(BlindedMessage {
            amount: denomination,
            keyset_id: keyset_id.clone(),
            blinded_secret,
        });
        batch.pending.push(PendingOutput {
            amount: denomination,
            keyset_id: keyset_id.clone(),
            secret,
            blinding_factor,
        });
    }

    Ok(batch)
}

/// Unblind a mint response against the retained private state, producing
/// proofs. `signatures` must be in the same order as the outputs that
/// produced `pending` (spec §4.E item 3 / §4.B "unblind").
pub fn unblind(
    signatures: Vec<BlindSignature>,
    pending: Vec<PendingOutput>,
    keys: &Keys,
) -> Result<Proofs, Error> {
    if signatures.len() != pending.len() {
        return Err(Error::BlindingFailure(format!(
            "expected {} signatures, got {}",
            pending.len(),
            signatures.len()
        )));
    }

    let rs: Vec<SecretKey> = pending.iter().map(|p| p.blinding_factor.clone()).collect();
    let secrets: Vec<Secret> = pending.into_iter().map(|p| p.secret).collect();

    construct_proofs(signatures, rs, secrets, keys).map_err(|e| Error::BlindingFailure(e.to_string()))
}
