//! Business-rule error taxonomy for settlement operations.
//!
//! Every variant is a synchronous business outcome, not a fault: operations
//! return them to the caller with enough structured detail to render a
//! precise message, and never leave the ledger partially mutated. Genuine
//! infrastructure failures flow through `anyhow` at the binary edge instead.

use crate::types::LockKind;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    /// Malformed or unauthorized input.
    #[error("{0}")]
    Validation(String),

    /// The acting team cannot fund the debit.
    #[error("Insufficient capital: required {required}, available {available}")]
    InsufficientCapital {
        required: Decimal,
        available: Decimal,
    },

    /// The seller holds fewer unreserved shares than the order asks for.
    #[error("Insufficient holdings in {ticker}: requested {requested}, available {available}")]
    InsufficientPosition {
        ticker: String,
        requested: u64,
        available: u64,
    },

    /// The PIN exists but the supplied trade details do not match the bound
    /// order. The order stays open; a wrong guess must not burn it.
    #[error("Trade details do not match the order bound to this PIN")]
    PinMismatch,

    /// Stale or unknown PIN, trade id, or position reference.
    #[error("No open order or position matches the supplied reference")]
    NotFound,

    /// Verification found the seller short of margin; the trade was
    /// auto-rejected in the same transaction.
    #[error("Seller {seller} has insufficient free capital: margin required {margin_required}, free {free_capital}")]
    InsufficientMargin {
        buyer: String,
        seller: String,
        margin_required: Decimal,
        free_capital: Decimal,
    },

    /// Short exposure would exceed the leverage cap at open time.
    #[error("Short exposure {exposure} exceeds the leverage limit {limit}")]
    LeverageExceeded { exposure: Decimal, limit: Decimal },

    /// A cover request for more than the position's remaining open quantity.
    #[error("Cover quantity {requested} exceeds remaining open quantity {remaining}")]
    OverCover { requested: u64, remaining: u64 },

    /// The feature gate is closed for ordinary traders.
    #[error("{0} trading is currently locked")]
    LockClosed(LockKind),

    /// Round outside the configured session range, or an operation invoked
    /// in a round where it is not available.
    #[error("Round {round} is not valid here (session runs rounds 0..={max_round})")]
    InvalidRound { round: u32, max_round: u32 },

    /// A racing request already consumed the PIN or transitioned the trade.
    #[error("A concurrent request already settled this order")]
    ConcurrentConflict,

    /// Every 4-digit PIN is currently bound to an open order.
    #[error("No free PINs remain in the 4-digit space")]
    PinSpaceExhausted,
}

impl SettlementError {
    /// Wire code for the `error` field of the response envelope.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::InsufficientCapital { .. } => "INSUFFICIENT_CAPITAL",
            Self::InsufficientPosition { .. } => "INSUFFICIENT_POSITION",
            Self::PinMismatch => "PIN_MISMATCH",
            Self::NotFound => "NOT_FOUND",
            Self::InsufficientMargin { .. } => "INSUFFICIENT_MARGIN",
            Self::LeverageExceeded { .. } => "LEVERAGE_EXCEEDED",
            Self::OverCover { .. } => "OVER_COVER",
            Self::LockClosed(_) => "LOCK_CLOSED",
            Self::InvalidRound { .. } => "INVALID_ROUND",
            Self::ConcurrentConflict => "CONCURRENT_CONFLICT",
            Self::PinSpaceExhausted => "PIN_SPACE_EXHAUSTED",
        }
    }

    /// Shorthand for a validation failure with a formatted message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;
