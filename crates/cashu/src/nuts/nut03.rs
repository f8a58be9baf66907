//! NUT-03: swap — burn N proofs, issue M proofs of equal total.
//!
//! <https://github.com/cashubtc/nuts/blob/main/03.md>

use serde::{Deserialize, Serialize};

use super::{BlindSignature, BlindedMessage, Proofs};

/// `POST /v1/swap` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequest {
    /// Proofs being spent.
    pub inputs: Proofs,
    /// Blinded outputs to be signed in exchange, ordering preserved in the
    /// response (spec §4.E, §6.2).
    pub outputs: Vec<BlindedMessage>,
}

/// `POST /v1/swap` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapResponse {
    /// Blind signatures, one per output, same order.
    pub signatures: Vec<BlindSignature>,
}
