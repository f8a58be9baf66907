//! Cashu (BDHKE) protocol primitives: amounts, blinding, and the NUT wire
//! types consumed by the paywall wallet core.
//!
//! This crate has no wallet state and performs no I/O; it is the
//! equivalent of `cashubtc-cdk`'s `cashu` crate, trimmed to the subset of
//! NUTs the wallet core actually speaks (NUT-00/01/02/03/04/07).

#![warn(missing_docs)]

pub mod amount;
pub mod dhke;
pub mod error;
pub mod mint_url;
pub mod nuts;
pub mod secret;

pub use self::amount::Amount;
pub use self::error::Error;
pub use self::mint_url::MintUrl;
pub use self::nuts::*;
pub use self::secret::Secret;
