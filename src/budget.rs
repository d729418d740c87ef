use alloy_primitives::{Address, B256, U256, keccak256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::error::{GuardError, Result};

/// Budgets are keyed by the keccak256 hash of a human-readable name.
pub type BudgetId = B256;

pub fn budget_id(name: &str) -> BudgetId {
    keccak256(name.as_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetState {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub id: BudgetId,
    pub owner: Address,
    pub max_gas_price: U256,
    pub max_total_gas: U256,
    pub spent: U256,
    pub state: BudgetState,
}

impl Budget {
    pub fn remaining(&self) -> U256 {
        // spent <= max_total_gas is kept by record_spending
        self.max_total_gas - self.spent
    }

    pub fn is_open(&self) -> bool {
        self.state == BudgetState::Open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetCheck {
    pub within_price: bool,
    pub within_total: bool,
}

/// Spending caps keyed by id. Closed budgets stay in the map so their ids
/// can never be issued again.
#[derive(Debug, Default, Clone)]
pub struct BudgetLedger {
    budgets: HashMap<BudgetId, Budget>,
}

impl BudgetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.budgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.budgets.is_empty()
    }

    pub fn get(&self, id: &BudgetId) -> Result<&Budget> {
        self.budgets
            .get(id)
            .ok_or_else(|| GuardError::budget_not_found(*id))
    }

    fn get_mut(&mut self, id: &BudgetId) -> Result<&mut Budget> {
        self.budgets
            .get_mut(id)
            .ok_or_else(|| GuardError::budget_not_found(*id))
    }

    pub fn create(
        &mut self,
        caller: Address,
        id: BudgetId,
        max_gas_price: U256,
        max_total_gas: U256,
    ) -> Result<&Budget> {
        if self.budgets.contains_key(&id) {
            return Err(GuardError::DuplicateBudget(id));
        }
        if max_gas_price.is_zero() {
            return Err(GuardError::InvalidParams("max gas price must be non-zero"));
        }
        if max_total_gas.is_zero() {
            return Err(GuardError::InvalidParams("max total gas must be non-zero"));
        }

        info!(%id, owner = %caller, %max_gas_price, %max_total_gas, "budget created");
        Ok(&*self.budgets.entry(id).or_insert(Budget {
            id,
            owner: caller,
            max_gas_price,
            max_total_gas,
            spent: U256::ZERO,
            state: BudgetState::Open,
        }))
    }

    pub fn close(&mut self, caller: &Address, id: &BudgetId) -> Result<()> {
        let budget = self.get_mut(id)?;
        if budget.owner != *caller {
            return Err(GuardError::Unauthorized(*caller));
        }
        if !budget.is_open() {
            return Err(GuardError::AlreadyClosed(*id));
        }

        budget.state = BudgetState::Closed;
        info!(%id, spent = %budget.spent, "budget closed");
        Ok(())
    }

    /// Charges `gas_used * gas_price` against the budget and returns the cost.
    /// Only the budget owner may record spending. Nothing is applied on error.
    pub fn record_spending(
        &mut self,
        caller: &Address,
        id: &BudgetId,
        gas_used: U256,
        gas_price: U256,
    ) -> Result<U256> {
        let budget = self.get_mut(id)?;
        if budget.owner != *caller {
            return Err(GuardError::Unauthorized(*caller));
        }
        if !budget.is_open() {
            return Err(GuardError::BudgetClosed(*id));
        }

        let remaining = budget.remaining();
        let cost = gas_used.checked_mul(gas_price).unwrap_or(U256::MAX);
        if cost > remaining {
            warn!(%id, %cost, %remaining, "spending rejected, over budget");
            return Err(GuardError::OverBudget { cost, remaining });
        }

        budget.spent += cost;
        info!(%id, %gas_used, %gas_price, %cost, spent = %budget.spent, "spending recorded");
        Ok(cost)
    }

    pub fn remaining(&self, id: &BudgetId) -> Result<U256> {
        Ok(self.get(id)?.remaining())
    }

    /// Checks the current state only: `within_total` does not look ahead at
    /// a prospective next spend.
    pub fn is_within_budget(&self, id: &BudgetId, gas_price: U256) -> Result<BudgetCheck> {
        let budget = self.get(id)?;
        Ok(BudgetCheck {
            within_price: gas_price <= budget.max_gas_price,
            within_total: budget.spent <= budget.max_total_gas,
        })
    }
}
