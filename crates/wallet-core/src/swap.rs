//! Swap/split engine (component F, spec §4.F): builds "send + keep"
//! partitions so the wallet can hand over an exact-amount token while
//! retaining the remainder.

use cashu::{Amount, Id, Proof, Proofs, ProofsMethods, State};
use tracing::{info, instrument, warn};

use crate::blinding::{self, BlindedBatch};
use crate::error::Error;
use crate::keyset_cache::KeysetCache;
use crate::mint_client::MintClient;

/// The outcome of [`split_to_exact`]: proofs to hand to the counterparty
/// and proofs to keep in the store. The caller is responsible for
/// removing the original inputs and adding `keep` to the store (spec
/// §4.F "the caller removes inputs and adds keep-proofs").
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    /// Proofs summing exactly to the requested target.
    pub send: Proofs,
    /// Proofs summing to the change, to be re-added to the store.
    pub keep: Proofs,
}

/// Produce `(send Σ = target, keep Σ = Σinputs - target)` from a selected
/// input set whose sum is `>= target` (spec §4.F).
///
/// If `inputs` already sum exactly to `target`, no swap is issued and the
/// inputs become `send` directly.
#[instrument(skip(inputs, mint_client, keyset_cache), fields(target = %target))]
pub async fn split_to_exact(
    inputs: Proofs,
    target: Amount,
    keyset_id: &Id,
    mint_client: &MintClient,
    keyset_cache: &KeysetCache,
) -> Result<SplitOutcome, Error> {
    let total_in = inputs.total_amount()?;
    if total_in < target {
        return Err(Error::SwapFailed(format!(
            "inputs sum to {total_in}, below target {target}"
        )));
    }

    if total_in == target {
        info!("inputs match target exactly, no swap required");
        return Ok(SplitOutcome {
            send: inputs,
            keep: Vec::new(),
        });
    }

    let change = total_in - target;
    let keys = keyset_cache.ensure_keys(mint_client, keyset_id).await?;

    let mut target_batch = blinding::blind(target, keyset_id, &keys)?;
    let change_batch = blinding::blind(change, keyset_id, &keys)?;
    let send_output_count = target_batch.len();
    target_batch.extend(change_batch);
    let combined = target_batch;

    let signatures = match mint_client
        .swap(inputs.clone(), combined.outputs.clone())
        .await
    {
        Ok(signatures) => signatures,
        Err(err) => return Err(recover_from_swap_failure(err, &inputs, mint_client).await),
    };

    let BlindedBatch { pending, .. } = combined;
    let proofs = blinding::unblind(signatures, pending, &keys)?;

    let send = proofs[..send_output_count].to_vec();
    let keep = proofs[send_output_count..].to_vec();

    Ok(SplitOutcome { send, keep })
}

/// On a swap failure, check whether it is because the mint considers some
/// inputs already spent (spec §4.F "partial recovery: all still-valid
/// inputs remain in the store, all spent inputs are removed"). Returns
/// [`Error::ProofsInvalid`] naming the spent secrets when that is
/// determined, otherwise the original [`Error::SwapFailed`].
async fn recover_from_swap_failure(
    original: Error,
    inputs: &[Proof],
    mint_client: &MintClient,
) -> Error {
    let ys = inputs.ys();
    let states = match mint_client.check_state(ys).await {
        Ok(states) => states,
        Err(_) => return original,
    };

    let spent_secrets: Vec<String> = inputs
        .iter()
        .zip(states)
        .filter(|(_, state)| state.state == State::Spent)
        .map(|(proof, _)| proof.secret.to_string())
        .collect();

    if spent_secrets.is_empty() {
        warn!("swap failed for a reason other than already-spent inputs");
        original
    } else {
        Error::ProofsInvalid { spent_secrets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashu::Secret;
    use cashu::SecretKey as CashuSecretKey;

    fn proof(amount: u64, id: &Id) -> Proof {
        Proof::new(
            Amount::from_u64(amount),
            id.clone(),
            Secret::generate(),
            CashuSecretKey::generate().public_key(),
        )
    }

    #[tokio::test]
    async fn exact_match_skips_swap() {
        // When inputs already sum to target, split_to_exact must not
        // touch the network at all — we pass a mint client pointed at an
        // address nothing listens on; any actual call would error.
        let id = Id::from_bytes(vec![0u8; 8]);
        let inputs = vec![proof(5, &id)];
        let mint_client = MintClient::new("https://127.0.0.1:1".parse().unwrap(), 0);
        let keyset_cache = KeysetCache::new();

        let outcome = split_to_exact(
            inputs.clone(),
            Amount::from_u64(5),
            &id,
            &mint_client,
            &keyset_cache,
        )
        .await
        .unwrap();

        assert_eq!(outcome.send, inputs);
        assert!(outcome.keep.is_empty());
    }

    #[tokio::test]
    async fn insufficient_inputs_are_rejected_before_any_network_call() {
        let id = Id::from_bytes(vec![0u8; 8]);
        let inputs = vec![proof(2, &id)];
        let mint_client = MintClient::new("https://127.0.0.1:1".parse().unwrap(), 0);
        let keyset_cache = KeysetCache::new();

        let err = split_to_exact(
            inputs,
            Amount::from_u64(5),
            &id,
            &mint_client,
            &keyset_cache,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::SwapFailed(_)));
    }
}
