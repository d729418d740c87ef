use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasObservation {
    pub sequence: u64,
    pub base_fee: U256,
    pub gas_price: U256,
    pub reporter: Address,
    pub timestamp: u64,
}

/// Mean base fee and gas price over a window, truncated toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasAverage {
    pub base_fee: U256,
    pub gas_price: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStats {
    pub samples: u64,
    pub min: U256,
    pub max: U256,
    pub mean: U256,
}

/// Append-only record of every reported observation. Never pruned, so the
/// sequence number of an entry is also its index.
#[derive(Debug, Default, Clone)]
pub struct HistoryLedger {
    entries: Vec<GasObservation>,
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &mut self,
        base_fee: U256,
        gas_price: U256,
        reporter: Address,
        timestamp: u64,
    ) -> &GasObservation {
        let sequence = self.entries.len() as u64;
        self.entries.push(GasObservation {
            sequence,
            base_fee,
            gas_price,
            reporter,
            timestamp,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // latest observation at the tail
    pub fn latest(&self) -> Option<&GasObservation> {
        self.entries.last()
    }

    pub fn get(&self, sequence: u64) -> Option<&GasObservation> {
        usize::try_from(sequence)
            .ok()
            .and_then(|idx| self.entries.get(idx))
    }

    /// Last `min(n, len)` entries; `n == 0` selects the whole history.
    fn window(&self, n: u64) -> Result<&[GasObservation]> {
        if self.entries.is_empty() {
            return Err(GuardError::EmptyHistory);
        }
        let len = self.entries.len();
        let take = match usize::try_from(n) {
            Ok(0) | Err(_) => len,
            Ok(n) => n.min(len),
        };
        Ok(&self.entries[len - take..])
    }

    pub fn average_over_last(&self, n: u64) -> Result<GasAverage> {
        let window = self.window(n)?;
        let mut base_sum = U256::ZERO;
        let mut price_sum = U256::ZERO;
        for obs in window {
            base_sum = base_sum
                .checked_add(obs.base_fee)
                .ok_or(GuardError::ArithmeticOverflow("base fee average"))?;
            price_sum = price_sum
                .checked_add(obs.gas_price)
                .ok_or(GuardError::ArithmeticOverflow("gas price average"))?;
        }

        let count = U256::from(window.len());
        Ok(GasAverage {
            base_fee: base_sum / count,
            gas_price: price_sum / count,
        })
    }

    /// Gas price spread over the same window `average_over_last` uses.
    pub fn window_stats(&self, n: u64) -> Result<WindowStats> {
        let window = self.window(n)?;
        let first = window[0].gas_price;
        let (mut min, mut max, mut sum) = (first, first, U256::ZERO);
        for obs in window {
            min = min.min(obs.gas_price);
            max = max.max(obs.gas_price);
            sum = sum
                .checked_add(obs.gas_price)
                .ok_or(GuardError::ArithmeticOverflow("gas price stats"))?;
        }

        Ok(WindowStats {
            samples: window.len() as u64,
            min,
            max,
            mean: sum / U256::from(window.len()),
        })
    }
}
