use alloy_primitives::U256;
use alloy_rpc_types_eth::FeeHistory;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{GuardError, Result};

/// Network conditions at the moment of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasQuote {
    pub base_fee: U256,
    pub gas_price: U256,
}

impl GasQuote {
    pub fn new(base_fee: u64, gas_price: u64) -> Self {
        Self {
            base_fee: U256::from(base_fee),
            gas_price: U256::from(gas_price),
        }
    }
}

/// Where `report_gas` reads the current base fee and gas price from. Called
/// synchronously while the report is being applied.
pub trait GasPriceSource: Send + Sync {
    fn current(&self) -> Result<GasQuote>;
}

pub trait Clock: Send + Sync {
    /// Seconds since the unix epoch.
    fn now(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Latest quote published by a feed. Reads fail until the first publish.
#[derive(Debug, Default)]
pub struct SharedQuote {
    latest: RwLock<Option<GasQuote>>,
}

impl SharedQuote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(quote: GasQuote) -> Self {
        Self {
            latest: RwLock::new(Some(quote)),
        }
    }

    pub fn publish(&self, quote: GasQuote) {
        *self.latest.write() = Some(quote);
    }

    pub fn clear(&self) {
        *self.latest.write() = None;
    }
}

impl GasPriceSource for SharedQuote {
    fn current(&self) -> Result<GasQuote> {
        (*self.latest.read())
            .ok_or_else(|| GuardError::SourceUnavailable("no quote published yet".to_string()))
    }
}

impl<S: GasPriceSource + ?Sized> GasPriceSource for std::sync::Arc<S> {
    fn current(&self) -> Result<GasQuote> {
        (**self).current()
    }
}

/// Derives a quote from an `eth_feeHistory` response: the next block's base
/// fee plus the median of the first requested reward percentile.
pub fn quote_from_fee_history(history: &FeeHistory) -> Option<GasQuote> {
    // the last entry is the base fee of the block after the newest one
    let base_fee = *history.base_fee_per_gas.last()?;

    let mut tips: Vec<u128> = history
        .reward
        .as_ref()
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|percentiles| percentiles.first().copied())
                .collect()
        })
        .unwrap_or_default();
    tips.sort_unstable();
    let tip = tips.get(tips.len() / 2).copied().unwrap_or(0);

    Some(GasQuote {
        base_fee: U256::from(base_fee),
        gas_price: U256::from(base_fee.saturating_add(tip)),
    })
}
