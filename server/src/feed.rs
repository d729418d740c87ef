use alloy_rpc_types_eth::FeeHistory;
use gas_guard::SharedQuote;
use gas_guard::source::quote_from_fee_history;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const GWEI: u128 = 1_000_000_000;

/// Synthetic `eth_feeHistory` generator standing in for a node connection.
/// The base fee moves at most 12.5% per block, as EIP-1559 allows.
pub struct FeeSimulator {
    state: u64,
    base_fee: u128,
    block: u64,
}

impl FeeSimulator {
    pub fn new(seed: u64, start_base_fee: u128) -> Self {
        Self {
            // xorshift must not start at zero
            state: seed.max(1),
            base_fee: start_base_fee.max(1),
            block: 1,
        }
    }

    fn next_rand(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn step_base_fee(&mut self) -> u128 {
        let max_delta = (self.base_fee / 8).max(1);
        let delta = (self.next_rand() as u128) % (max_delta + 1);
        self.base_fee = if self.next_rand() % 2 == 0 {
            self.base_fee.saturating_add(delta)
        } else {
            self.base_fee.saturating_sub(delta).max(1)
        };
        self.base_fee
    }

    /// History for `blocks` new blocks with one reward percentile per block.
    pub fn next_history(&mut self, blocks: usize) -> FeeHistory {
        let oldest_block = self.block;
        let mut base_fee_per_gas = Vec::with_capacity(blocks + 1);
        let mut gas_used_ratio = Vec::with_capacity(blocks);
        let mut reward = Vec::with_capacity(blocks);

        base_fee_per_gas.push(self.base_fee);
        for _ in 0..blocks {
            let ratio = (self.next_rand() % 101) as f64 / 100.0;
            let tip = GWEI + (self.next_rand() as u128) % (2 * GWEI);
            gas_used_ratio.push(ratio);
            reward.push(vec![tip]);
            base_fee_per_gas.push(self.step_base_fee());
            self.block += 1;
        }

        FeeHistory {
            base_fee_per_gas,
            gas_used_ratio,
            oldest_block,
            reward: Some(reward),
            ..Default::default()
        }
    }
}

/// Publishes a fresh quote every `interval` until the task is aborted.
pub async fn run_feed(mut sim: FeeSimulator, quote: Arc<SharedQuote>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let history = sim.next_history(4);
        match quote_from_fee_history(&history) {
            Some(q) => {
                debug!(base_fee = %q.base_fee, gas_price = %q.gas_price, "feed quote");
                quote.publish(q);
            }
            None => warn!("fee history without base fees, skipping"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gas_guard::GasPriceSource;

    #[test]
    fn test_base_fee_moves_within_eip1559_bound() {
        let mut sim = FeeSimulator::new(42, 30 * GWEI);
        let history = sim.next_history(16);

        assert_eq!(history.base_fee_per_gas.len(), 17);
        assert_eq!(history.oldest_block, 1);
        for pair in history.base_fee_per_gas.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            assert!(next.abs_diff(prev) <= prev / 8 + 1);
        }
    }

    #[test]
    fn test_same_seed_same_fees() {
        let a = FeeSimulator::new(7, GWEI).next_history(8);
        let b = FeeSimulator::new(7, GWEI).next_history(8);
        assert_eq!(a.base_fee_per_gas, b.base_fee_per_gas);
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_publishes_quotes() {
        let quote = Arc::new(SharedQuote::new());
        let handle = tokio::spawn(run_feed(
            FeeSimulator::new(1, 20 * GWEI),
            quote.clone(),
            Duration::from_millis(50),
        ));

        tokio::time::sleep(Duration::from_millis(120)).await;
        let current = quote.current().unwrap();
        assert!(current.gas_price > current.base_fee);
        handle.abort();
    }
}
