//! The escrow PIN registry.
//!
//! A PIN is a one-shot capability: issued bound to exactly one live order,
//! unique among everything currently open, and released the moment it is
//! consumed or the order dies. Consumption itself happens in the flow
//! modules as part of the settling transaction; the registry only answers
//! "which order does this PIN belong to right now".

use mockstock_core::{Pin, SettlementError, SettlementResult};
use rand::Rng;
use std::collections::HashMap;
use uuid::Uuid;

const PIN_MIN: u16 = 1000;
const PIN_MAX: u16 = 9999;

/// Random draws before falling back to a deterministic sweep. The sweep
/// guarantees PIN_SPACE_EXHAUSTED fires only when the space truly is.
const RANDOM_DRAWS: usize = 128;

/// What a live PIN is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRef {
    StockSell(Uuid),
    OptionBuy(Uuid),
    Short(Uuid),
}

#[derive(Debug, Default)]
pub struct PinRegistry {
    active: HashMap<Pin, OrderRef>,
}

impl PinRegistry {
    /// Issues a fresh 4-digit PIN bound to `order`.
    ///
    /// # Errors
    ///
    /// `PinSpaceExhausted` when every PIN in 1000..=9999 is bound to a
    /// live order.
    pub fn issue<R: Rng>(&mut self, rng: &mut R, order: OrderRef) -> SettlementResult<Pin> {
        for _ in 0..RANDOM_DRAWS {
            let pin = Pin(rng.gen_range(PIN_MIN..=PIN_MAX));
            if !self.active.contains_key(&pin) {
                self.active.insert(pin, order);
                return Ok(pin);
            }
        }
        for raw in PIN_MIN..=PIN_MAX {
            let pin = Pin(raw);
            if !self.active.contains_key(&pin) {
                self.active.insert(pin, order);
                return Ok(pin);
            }
        }
        Err(SettlementError::PinSpaceExhausted)
    }

    #[must_use]
    pub fn lookup(&self, pin: Pin) -> Option<OrderRef> {
        self.active.get(&pin).copied()
    }

    /// Unbinds a PIN, returning it to the free pool.
    pub fn release(&mut self, pin: Pin) -> Option<OrderRef> {
        self.active.remove(&pin)
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.active.len()
    }
}
