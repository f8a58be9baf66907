//! NUT-04: mint — create a quote against a Lightning invoice, then mint
//! proofs once it is paid.
//!
//! <https://github.com/cashubtc/nuts/blob/main/04.md>

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{BlindSignature, BlindedMessage, CurrencyUnit};
use crate::amount::Amount;

/// The lifecycle state of a [`MintQuoteBolt11Response`] (spec §3 "Mint quote").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MintQuoteState {
    /// Invoice not yet paid.
    Unpaid,
    /// Invoice paid; not yet minted against.
    Paid,
    /// Proofs already issued for this quote — terminal.
    Issued,
}

impl fmt::Display for MintQuoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unpaid => "UNPAID",
            Self::Paid => "PAID",
            Self::Issued => "ISSUED",
        };
        write!(f, "{s}")
    }
}

/// `POST /v1/mint/quote/bolt11` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuoteBolt11Request {
    /// Amount requested.
    pub amount: Amount,
    /// Unit the wallet wants to mint in.
    pub unit: CurrencyUnit,
}

/// Response shared by `POST /v1/mint/quote/bolt11` and
/// `GET /v1/mint/quote/bolt11/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuoteBolt11Response {
    /// Quote id.
    pub quote: String,
    /// Bolt11 invoice the wallet must pay.
    pub request: String,
    /// Amount of the quote.
    pub amount: Amount,
    /// Current lifecycle state.
    pub state: MintQuoteState,
    /// Unix timestamp after which `mint` must not be attempted.
    pub expiry: u64,
}

/// `POST /v1/mint/bolt11` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintBolt11Request {
    /// Quote id the outputs are minted against.
    pub quote: String,
    /// Blinded outputs, signature ordering preserved in the response.
    pub outputs: Vec<BlindedMessage>,
}

/// `POST /v1/mint/bolt11` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintBolt11Response {
    /// Blind signatures, one per output, same order.
    pub signatures: Vec<BlindSignature>,
}
