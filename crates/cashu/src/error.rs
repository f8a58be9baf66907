//! Protocol-level errors shared by the BDHKE primitives and wire types.

use thiserror::Error;

/// Errors produced by the `cashu` crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A curve point failed to parse from its compressed SEC1 encoding.
    #[error("invalid curve point")]
    InvalidPoint,

    /// No key exists in a keyset for the requested denomination.
    #[error("no key for denomination {0}")]
    UnknownDenomination(u64),

    /// Adding two amounts overflowed `u64`.
    #[error("amount overflow")]
    AmountOverflow,

    /// A token or request carried an amount that can never be satisfied
    /// (zero, or not decomposable into keys the keyset provides).
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Failure converting to/from an elliptic curve type.
    #[error(transparent)]
    EllipticCurve(#[from] k256::elliptic_curve::Error),

    /// JSON (de)serialization failure.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Hex (de)serialization failure.
    #[error("invalid hex: {0}")]
    Hex(String),

    /// URL parse failure.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
