//! Blinded Diffie-Hellman key exchange (BDHKE) — spec §4.B.
//!
//! This crate only ever plays Alice (the wallet); there is no mint-signing
//! half here, since implementing a mint server is an explicit non-goal
//! (spec §1).

use std::ops::Mul;

use bitcoin::hashes::{sha256, Hash};
use k256::{ProjectivePoint, Scalar};

use crate::error::Error;
use crate::nuts::{BlindSignature, Keys, Proof, Proofs, PublicKey, SecretKey};
use crate::secret::Secret;

const DOMAIN_SEPARATOR: &[u8; 28] = b"Secp256k1_HashToCurve_Cashu_";

/// Hash an arbitrary message onto the secp256k1 curve, retrying with a
/// counter suffix until the resulting SEC1 point is valid (spec §4.B:
/// "compute `Y = hash_to_curve(secret)`").
pub fn hash_to_curve(message: &[u8]) -> k256::PublicKey {
    let mut msg_to_hash = [DOMAIN_SEPARATOR.as_slice(), message].concat();

    let mut counter: u32 = 0;
    loop {
        let hash = sha256::Hash::hash(&[msg_to_hash.as_slice(), &counter.to_le_bytes()].concat());
        let mut candidate = vec![0x02u8];
        candidate.extend_from_slice(hash.as_byte_array());
        match k256::PublicKey::from_sec1_bytes(&candidate) {
            Ok(pubkey) => return pubkey,
            Err(_) => {
                counter += 1;
                msg_to_hash = hash.as_byte_array().to_vec();
            }
        }
    }
}

/// Blind a secret: draw (or accept) a blinding factor `r`, compute
/// `B_ = Y + r*G`. Returns `(B_, r)`; the caller retains `r` until the
/// mint's signature comes back.
pub fn blind_message(
    secret: &[u8],
    blinding_factor: Option<SecretKey>,
) -> Result<(PublicKey, SecretKey), Error> {
    let y = hash_to_curve(secret);

    let r: k256::SecretKey = match blinding_factor {
        Some(sk) => sk.into(),
        None => k256::SecretKey::random(&mut rand::thread_rng()),
    };

    let b = ProjectivePoint::from(y) + ProjectivePoint::from(&r.public_key());
    let blinded = k256::PublicKey::try_from(b).map_err(|_| Error::InvalidPoint)?;

    Ok((blinded.into(), r.into()))
}

/// Unblind a mint's blind signature: `C = C_ - r*K` where `K` is the
/// mint's public key for the output's denomination (spec §4.B).
pub fn unblind_message(
    blinded_signature: PublicKey,
    r: SecretKey,
    mint_pubkey: PublicKey,
) -> Result<PublicKey, Error> {
    let c_blind: k256::PublicKey = blinded_signature.into();
    let k: k256::PublicKey = mint_pubkey.into();
    let r: k256::SecretKey = r.into();

    let c = ProjectivePoint::from(c_blind.as_affine())
        - ProjectivePoint::from(k.as_affine()) * Scalar::from(r.as_scalar_primitive());

    Ok(k256::PublicKey::try_from(c)
        .map_err(|_| Error::InvalidPoint)?
        .into())
}

/// Unblind a batch of signatures into proofs, matching each signature to
/// its output's retained `(secret, r)` by position (spec §4.B "unblind").
///
/// `len(promises) == len(rs) == len(secrets)` is a precondition; ordering
/// must mirror the outputs list sent to the mint (spec §4.E item 3).
pub fn construct_proofs(
    promises: Vec<BlindSignature>,
    rs: Vec<SecretKey>,
    secrets: Vec<Secret>,
    keys: &Keys,
) -> Result<Proofs, Error> {
    let mut proofs = Vec::with_capacity(promises.len());
    for ((promise, r), secret) in promises.into_iter().zip(rs).zip(secrets) {
        let mint_key = keys
            .amount_key(promise.amount)
            .ok_or(Error::UnknownDenomination(promise.amount.to_u64()))?
            .to_owned();

        let c = unblind_message(promise.c, r, mint_key)?;

        proofs.push(Proof::new(promise.amount, promise.keyset_id, secret, c));
    }

    Ok(proofs)
}
