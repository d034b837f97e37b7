//! Shared domain vocabulary for the settlement core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalizes a team name for use as a ledger key.
///
/// Team names arrive from clients in arbitrary casing; every entry point
/// normalizes before touching the ledger so `Team_Alpha` and `team_alpha`
/// are the same account.
#[must_use]
pub fn normalize_team(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Participant role, resolved from the seeded roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Broker,
    Admin,
}

impl Role {
    /// Brokers and admins bypass the advisory lock gates.
    #[must_use]
    pub const fn bypasses_locks(&self) -> bool {
        matches!(self, Self::Broker | Self::Admin)
    }

    /// Only brokers and admins may act on the verification queue.
    #[must_use]
    pub const fn can_verify(&self) -> bool {
        matches!(self, Self::Broker | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Broker => write!(f, "broker"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// The three admin-controlled feature gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    #[serde(rename = "option")]
    Options,
    News,
    #[serde(rename = "short")]
    Shorts,
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Options => write!(f, "option"),
            Self::News => write!(f, "news"),
            Self::Shorts => write!(f, "short"),
        }
    }
}

impl FromStr for LockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "option" | "options" => Ok(Self::Options),
            "news" => Ok(Self::News),
            "short" | "shorts" => Ok(Self::Shorts),
            other => Err(format!("unknown lock kind: {other}")),
        }
    }
}

/// State of a feature gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    Open,
    Closed,
}

impl LockState {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for LockState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" | "close" | "locked" => Ok(Self::Closed),
            other => Err(format!("unknown lock state: {other}")),
        }
    }
}

/// Option contract direction.
///
/// The trade tickets circulating between teams use the `Call-B` / `Put-B`
/// labels, while the premium tables key on plain `call` / `put`; both
/// spellings parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "Call-B"),
            Self::Put => write!(f, "Put-B"),
        }
    }
}

impl FromStr for OptionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        if lowered.starts_with("call") {
            Ok(Self::Call)
        } else if lowered.starts_with("put") {
            Ok(Self::Put)
        } else {
            Err(format!("unknown option type: {s}"))
        }
    }
}

/// A 4-digit escrow token.
///
/// Issued by the registry from the 1000..=9999 range, displayed zero-padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pin(pub u16);

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

impl FromStr for Pin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u16>()
            .map(Pin)
            .map_err(|_| format!("invalid PIN: {s}"))
    }
}

/// Lifecycle of a peer-to-peer stock sell order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockOrderStatus {
    Open,
    Settled,
    Cancelled,
}

impl fmt::Display for StockOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Lifecycle of a two-sided option order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptionOrderStatus {
    AwaitingSeller,
    AwaitingBroker,
    Verified,
    Rejected,
    Cancelled,
}

impl OptionOrderStatus {
    /// Terminal states admit no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Rejected | Self::Cancelled)
    }
}

impl fmt::Display for OptionOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingSeller => write!(f, "AWAITING_SELLER"),
            Self::AwaitingBroker => write!(f, "AWAITING_BROKER"),
            Self::Verified => write!(f, "VERIFIED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Lifecycle of a short position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShortStatus {
    Open,
    PartiallyCovered,
    Closed,
}

impl ShortStatus {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::PartiallyCovered)
    }
}

impl fmt::Display for ShortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::PartiallyCovered => write!(f, "PARTIALLY_COVERED"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}
