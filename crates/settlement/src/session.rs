//! The round and lock controller.
//!
//! Round and lock flags live in one versioned value. Gated operations take
//! a snapshot at their transaction boundary and validate against it rather
//! than reaching into ambient globals; the version lets observers tell two
//! otherwise-identical configurations apart.

use mockstock_core::{LockKind, LockState, Role, SettlementError, SettlementResult};
use serde::Serialize;

/// Immutable view of the session gates at one point in time.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub round: u32,
    pub max_round: u32,
    pub option_lock: LockState,
    pub news_lock: LockState,
    pub short_lock: LockState,
    pub version: u64,
}

impl SessionSnapshot {
    #[must_use]
    pub const fn lock(&self, kind: LockKind) -> LockState {
        match kind {
            LockKind::Options => self.option_lock,
            LockKind::News => self.news_lock,
            LockKind::Shorts => self.short_lock,
        }
    }

    /// Authoritative lock check: ordinary traders are gated, brokers and
    /// admins pass.
    pub fn ensure_unlocked(&self, kind: LockKind, role: Role) -> SettlementResult<()> {
        if role.bypasses_locks() || self.lock(kind).is_open() {
            Ok(())
        } else {
            Err(SettlementError::LockClosed(kind))
        }
    }

    /// Round 0 is the system-purchase phase; peer-to-peer flows need 1+.
    pub fn ensure_peer_round(&self) -> SettlementResult<()> {
        if self.round == 0 {
            return Err(SettlementError::InvalidRound {
                round: self.round,
                max_round: self.max_round,
            });
        }
        Ok(())
    }

    /// System purchases are only reachable in round 0.
    pub fn ensure_system_round(&self) -> SettlementResult<()> {
        if self.round != 0 {
            return Err(SettlementError::InvalidRound {
                round: self.round,
                max_round: self.max_round,
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct SessionState {
    round: u32,
    max_round: u32,
    option_lock: LockState,
    news_lock: LockState,
    short_lock: LockState,
    version: u64,
}

impl SessionState {
    #[must_use]
    pub const fn new(max_round: u32) -> Self {
        Self {
            round: 0,
            max_round,
            option_lock: LockState::Open,
            news_lock: LockState::Open,
            short_lock: LockState::Open,
            version: 0,
        }
    }

    #[must_use]
    pub const fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            round: self.round,
            max_round: self.max_round,
            option_lock: self.option_lock,
            news_lock: self.news_lock,
            short_lock: self.short_lock,
            version: self.version,
        }
    }

    #[must_use]
    pub const fn round(&self) -> u32 {
        self.round
    }

    #[must_use]
    pub const fn lock(&self, kind: LockKind) -> LockState {
        match kind {
            LockKind::Options => self.option_lock,
            LockKind::News => self.news_lock,
            LockKind::Shorts => self.short_lock,
        }
    }

    /// Moves the session to `round`. Already-settled orders are untouched;
    /// only subsequent reads and new orders see the new tables.
    pub fn set_round(&mut self, round: u32) -> SettlementResult<u32> {
        if round > self.max_round {
            return Err(SettlementError::InvalidRound {
                round,
                max_round: self.max_round,
            });
        }
        self.round = round;
        self.version += 1;
        Ok(round)
    }

    pub fn set_lock(&mut self, kind: LockKind, state: LockState) -> LockState {
        match kind {
            LockKind::Options => self.option_lock = state,
            LockKind::News => self.news_lock = state,
            LockKind::Shorts => self.short_lock = state,
        }
        self.version += 1;
        state
    }
}
