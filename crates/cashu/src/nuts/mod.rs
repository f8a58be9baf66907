//! Wire-level NUT (Notation, Usage, Terminology) types consumed by the
//! wallet core: proofs, keys, keysets, and the mint HTTP request/response
//! bodies named in spec §6.2.

pub mod nut00;
pub mod nut01;
pub mod nut02;
pub mod nut03;
pub mod nut04;
pub mod nut07;

pub use nut00::{BlindSignature, BlindedMessage, Proof, Proofs, ProofsMethods};
pub use nut01::{PublicKey, SecretKey};
pub use nut02::{CurrencyUnit, Id, KeySet, KeySetInfo, Keys};
pub use nut03::{SwapRequest, SwapResponse};
pub use nut04::{
    MintBolt11Request, MintBolt11Response, MintQuoteBolt11Request, MintQuoteBolt11Response,
    MintQuoteState,
};
pub use nut07::{CheckStateRequest, CheckStateResponse, ProofState, State};
