//! Wallet-level error taxonomy (spec §7).
//!
//! Every variant carries structured context rather than a bare string, so
//! callers branch on the error class instead of string-matching (spec §9
//! "dynamic error codes"). [`Error::user_message`] is total over the
//! variants and is the single place that renders a user-facing sentence.

use std::fmt;

use cashu::Amount;
use thiserror::Error;

/// The context carried by [`Error::InsufficientBalance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsufficientBalanceContext {
    /// Amount the caller asked for.
    pub requested: Amount,
    /// Amount actually available (excluding pending proofs).
    pub available: Amount,
    /// Non-pending proof counts, keyed by denomination.
    pub denomination_counts: Vec<(Amount, usize)>,
}

impl InsufficientBalanceContext {
    /// `requested - available`, saturating at zero.
    pub fn shortfall(&self) -> Amount {
        self.requested
            .checked_sub(self.available)
            .unwrap_or(Amount::ZERO)
    }
}

impl fmt::Display for InsufficientBalanceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "requested {}, available {}",
            self.requested, self.available
        )
    }
}

/// The context carried by [`Error::PaymentRequired`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequiredContext {
    /// Amount the paywall server requires.
    pub required: Amount,
    /// Mint the server expects the token to be drawn from.
    pub mint_url: String,
}

impl fmt::Display for PaymentRequiredContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} required at {}", self.required, self.mint_url)
    }
}

/// Wallet-core error taxonomy (spec §7).
#[derive(Debug, Error)]
pub enum Error {
    // --- Wallet-level ---
    /// The mint could not be reached over HTTP.
    #[error("mint unreachable: {0}")]
    MintUnreachable(String),
    /// The storage adapter failed to load persisted state.
    #[error("failed to load wallet state: {0}")]
    LoadFailed(String),
    /// The storage adapter failed to persist state.
    #[error("failed to save wallet state: {0}")]
    SaveFailed(String),
    /// A token string failed to decode (spec §4.H).
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// A token's mint URL did not match the wallet's configured mint.
    #[error("mint mismatch: token mint `{token_mint}` does not match wallet mint `{wallet_mint}`")]
    MintMismatch {
        /// Mint URL carried by the token.
        token_mint: String,
        /// Mint URL the wallet is configured against.
        wallet_mint: String,
    },
    /// A received token could not be swapped into the wallet's store.
    #[error("failed to receive token: {0}")]
    ReceiveFailed(String),

    // --- Token-creation ---
    /// The store does not hold enough non-pending value.
    #[error("insufficient balance: {0}")]
    InsufficientBalance(InsufficientBalanceContext),
    /// A selection strategy could not produce a result (distinct from
    /// plain insufficient balance, e.g. an internal invariant violation).
    #[error("proof selection failed: {0}")]
    SelectionFailed(String),
    /// A caller requested a non-positive or otherwise invalid amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    /// An operation was attempted before `load()` completed.
    #[error("wallet not loaded")]
    WalletNotLoaded,
    /// The mint rejected a swap outright.
    #[error("swap failed: {0}")]
    SwapFailed(String),
    /// The mint rejected a non-swap request (keysets, keys, quote, mint)
    /// with a 4xx status.
    #[error("mint rejected request: {0}")]
    MintRejected(String),
    /// The mint reported some swap inputs as already spent (spec §4.F).
    /// Still-valid inputs remain in the store; this lists the secrets the
    /// caller removed.
    #[error("{} of the swap's inputs were already spent", .spent_secrets.len())]
    ProofsInvalid {
        /// Secrets the mint reported as spent.
        spent_secrets: Vec<String>,
    },

    // --- Mint-protocol ---
    /// `mint` was attempted against a quote that has not been paid.
    #[error("quote not paid")]
    QuoteNotPaid,
    /// `mint` was attempted after the quote's expiry.
    #[error("quote expired")]
    QuoteExpired,
    /// A blind signature referenced a keyset the wallet has no record of.
    #[error("unknown keyset: {0}")]
    UnknownKeyset(String),
    /// The blinding/unblinding algorithm failed (spec §4.B).
    #[error("blinding failure: {0}")]
    BlindingFailure(String),

    // --- Proof-state ---
    /// The mint reports a proof as already spent.
    #[error("proof already spent")]
    ProofSpent,
    /// The mint reports a proof as pending at the mint itself.
    #[error("proof pending at mint")]
    ProofPending,

    // --- Paywall ---
    /// The paywall server returned HTTP 402.
    #[error("payment required: {0}")]
    PaymentRequired(PaymentRequiredContext),
    /// The paywall server rejected a submitted token (not a 402). The
    /// request reached the server; whether the token was actually spent is
    /// unknown from this response alone.
    #[error("payment rejected: {0}")]
    PaymentRejected(String),
    /// The paywall server returned a 5xx or malformed response, or the
    /// request timed out after being sent. The outcome at the server is
    /// unknown.
    #[error("paywall server error: {0}")]
    ServerError(String),
    /// The paywall could not be connected to at all — the request never
    /// left the client.
    #[error("paywall unreachable: {0}")]
    PaywallUnreachable(String),

    /// Wraps a protocol-level error from the `cashu` crate.
    #[error(transparent)]
    Protocol(#[from] cashu::Error),
}

impl Error {
    /// `true` if the wallet remains usable after this error — it is
    /// reported with a recovery suggestion and never fatal to the wallet
    /// (spec §7 "Propagation").
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MintUnreachable(_)
                | Error::PaywallUnreachable(_)
                | Error::MintMismatch { .. }
                | Error::InsufficientBalance(_)
        )
    }

    /// A short machine-readable code, stable across releases, for callers
    /// that want to branch without matching on the enum directly.
    pub fn code(&self) -> &'static str {
        match self {
            Error::MintUnreachable(_) => "MINT_UNREACHABLE",
            Error::LoadFailed(_) => "LOAD_FAILED",
            Error::SaveFailed(_) => "SAVE_FAILED",
            Error::InvalidToken(_) => "INVALID_TOKEN",
            Error::MintMismatch { .. } => "MINT_MISMATCH",
            Error::ReceiveFailed(_) => "RECEIVE_FAILED",
            Error::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            Error::SelectionFailed(_) => "SELECTION_FAILED",
            Error::InvalidAmount(_) => "INVALID_AMOUNT",
            Error::WalletNotLoaded => "WALLET_NOT_LOADED",
            Error::SwapFailed(_) => "SWAP_FAILED",
            Error::MintRejected(_) => "MINT_REJECTED",
            Error::ProofsInvalid { .. } => "PROOFS_INVALID",
            Error::QuoteNotPaid => "QUOTE_NOT_PAID",
            Error::QuoteExpired => "QUOTE_EXPIRED",
            Error::UnknownKeyset(_) => "UNKNOWN_KEYSET",
            Error::BlindingFailure(_) => "BLINDING_FAILURE",
            Error::ProofSpent => "PROOF_SPENT",
            Error::ProofPending => "PROOF_PENDING",
            Error::PaymentRequired(_) => "PAYMENT_REQUIRED",
            Error::PaymentRejected(_) => "PAYMENT_REJECTED",
            Error::ServerError(_) => "SERVER_ERROR",
            Error::PaywallUnreachable(_) => "PAYWALL_UNREACHABLE",
            Error::Protocol(_) => "PROTOCOL_ERROR",
        }
    }

    /// The single, total, user-oriented message function over the error
    /// taxonomy (spec §7 "User-visible behavior", §9 "a single user
    /// message function is total over the variants").
    pub fn user_message(&self) -> String {
        match self {
            Error::InsufficientBalance(ctx) => {
                let shortfall = ctx.shortfall().to_u64();
                let noun = if shortfall == 1 { "credit" } else { "credits" };
                format!(
                    "Need {shortfall} more {noun} (have {have}, need {need})",
                    have = ctx.available,
                    need = ctx.requested,
                )
            }
            Error::MintMismatch {
                token_mint,
                wallet_mint,
            } => format!(
                "This token is from {token_mint}, but this wallet uses {wallet_mint}"
            ),
            Error::PaymentRequired(ctx) => format!(
                "This content costs {} credits from {}",
                ctx.required, ctx.mint_url
            ),
            Error::MintUnreachable(_) => "Could not reach the mint. Check your connection and try again.".to_string(),
            Error::PaywallUnreachable(_) => "Could not reach the paywall. Check your connection and try again.".to_string(),
            Error::QuoteExpired => "This invoice expired before it was paid. Please create a new one.".to_string(),
            Error::ProofSpent => "These credits have already been spent.".to_string(),
            Error::WalletNotLoaded => "The wallet hasn't finished loading yet.".to_string(),
            other => other.to_string(),
        }
    }
}
