//! Treasury: the platform balance that funds yield distributions.
//!
//! The treasury only knows its balance and a yield rate. The yield pool is a
//! fixed fraction of the balance; distributing it debits the treasury in the
//! same commit that records the payout run.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::TreasuryError;
use crate::ledger::TOTAL_BPS;

pub type TreasuryResult<T> = std::result::Result<T, TreasuryError>;

/// Persisted treasury state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryState {
    pub balance: u64,
    pub total_deposited: u64,
    pub total_released: u64,
}

#[derive(Debug)]
pub struct Treasury {
    state: Mutex<TreasuryState>,
    yield_bps: u32,
}

impl Treasury {
    pub fn new(yield_bps: u32) -> Self {
        Self::with_state(TreasuryState::default(), yield_bps)
    }

    pub fn with_state(state: TreasuryState, yield_bps: u32) -> Self {
        Self {
            state: Mutex::new(state),
            yield_bps: yield_bps.min(TOTAL_BPS),
        }
    }

    pub fn state(&self) -> TreasuryState {
        *self.state.lock().expect("treasury lock poisoned")
    }

    pub fn balance(&self) -> u64 {
        self.state().balance
    }

    pub fn yield_bps(&self) -> u32 {
        self.yield_bps
    }

    /// Size of the next yield pool: `balance × yield_bps / 10000`, rounded down.
    pub fn yield_pool(&self) -> u64 {
        let pool = u128::from(self.balance()) * u128::from(self.yield_bps) / u128::from(TOTAL_BPS);
        pool as u64
    }

    pub fn plan_deposit(&self, amount: u64) -> TreasuryResult<TreasuryState> {
        if amount == 0 {
            return Err(TreasuryError::Validation {
                message: "deposit must be positive".into(),
            });
        }
        let mut next = self.state();
        next.balance = next
            .balance
            .checked_add(amount)
            .ok_or_else(|| TreasuryError::Validation {
                message: "treasury balance overflow".into(),
            })?;
        next.total_deposited = next.total_deposited.saturating_add(amount);
        Ok(next)
    }

    pub fn plan_release(&self, amount: u64) -> TreasuryResult<TreasuryState> {
        let mut next = self.state();
        if amount > next.balance {
            return Err(TreasuryError::InsufficientFunds {
                requested: amount,
                balance: next.balance,
            });
        }
        next.balance -= amount;
        next.total_released = next.total_released.saturating_add(amount);
        Ok(next)
    }

    pub fn commit(&self, state: TreasuryState) {
        *self.state.lock().expect("treasury lock poisoned") = state;
    }
}
