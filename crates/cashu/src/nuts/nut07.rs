//! NUT-07: check-state — ask the mint whether proofs (identified by their
//! `Y` value) are still spendable.
//!
//! <https://github.com/cashubtc/nuts/blob/main/07.md>

use serde::{Deserialize, Serialize};

use super::PublicKey;

/// A proof's spend state as reported by the mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    /// Unspent and spendable.
    Unspent,
    /// Reserved by an in-flight operation at the mint (not the wallet's
    /// own pending state, which is purely local — spec §4.G).
    Pending,
    /// Already spent.
    Spent,
}

/// `POST /v1/checkstate` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckStateRequest {
    /// `hash_to_curve(secret)` for every proof being queried.
    #[serde(rename = "Ys")]
    pub ys: Vec<PublicKey>,
}

/// One entry of a [`CheckStateResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofState {
    /// The `Y` value this entry answers for.
    #[serde(rename = "Y")]
    pub y: PublicKey,
    /// Reported spend state.
    pub state: State,
}

/// `POST /v1/checkstate` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckStateResponse {
    /// One state per requested `Y`, same order as the request.
    pub states: Vec<ProofState>,
}
