use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{GuardError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractProfile {
    pub address: Address,
    pub name: String,
    pub avg_gas_used: U256,
    pub call_count: u64,
    pub total_gas_used: U256,
    pub last_updated: u64,
}

/// Running gas usage per contract. Profiles are created on first update and
/// never removed.
#[derive(Debug, Default, Clone)]
pub struct ProfileRegistry {
    profiles: HashMap<Address, ContractProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn get(&self, contract: &Address) -> Result<&ContractProfile> {
        self.profiles
            .get(contract)
            .ok_or_else(|| GuardError::profile_not_found(*contract))
    }

    /// Folds one call into the contract's profile. The name is overwritten on
    /// every update, empty strings included.
    pub fn update(
        &mut self,
        contract: Address,
        name: String,
        gas_used: U256,
        now: u64,
    ) -> Result<&ContractProfile> {
        if contract.is_zero() {
            return Err(GuardError::InvalidParams("contract must not be the zero address"));
        }

        // compute everything before touching the map so an overflow leaves it intact
        let (total_gas_used, call_count) = match self.profiles.get(&contract) {
            Some(p) => (
                p.total_gas_used
                    .checked_add(gas_used)
                    .ok_or(GuardError::ArithmeticOverflow("profile gas total"))?,
                p.call_count
                    .checked_add(1)
                    .ok_or(GuardError::ArithmeticOverflow("profile call count"))?,
            ),
            None => (gas_used, 1),
        };
        let avg_gas_used = total_gas_used / U256::from(call_count);

        debug!(%contract, %gas_used, call_count, %avg_gas_used, "profile updated");
        let profile = self
            .profiles
            .entry(contract)
            .or_insert_with(|| ContractProfile {
                address: contract,
                name: String::new(),
                avg_gas_used: U256::ZERO,
                call_count: 0,
                total_gas_used: U256::ZERO,
                last_updated: 0,
            });
        profile.name = name;
        profile.total_gas_used = total_gas_used;
        profile.call_count = call_count;
        profile.avg_gas_used = avg_gas_used;
        profile.last_updated = now;
        Ok(&*profile)
    }
}
