use alloy_primitives::Address;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Lock-free token bucket.
pub struct RateLimiter {
    tokens: AtomicU64,
    max_tokens: u64,
    refill_rate: u64,       // tokens per second
    origin: Instant,
    last_refill: AtomicU64, // nanos since origin
}

impl RateLimiter {
    pub fn new(rate: u64, max: u64) -> Self {
        Self {
            tokens: AtomicU64::new(max),
            max_tokens: max,
            refill_rate: rate,
            origin: Instant::now(),
            last_refill: AtomicU64::new(0),
        }
    }

    pub fn check_and_consume(&self) -> bool {
        self.refill();

        loop {
            let current = self.tokens.load(Ordering::SeqCst);
            if current == 0 {
                return false;
            }
            if self
                .tokens
                .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn refill(&self) {
        if self.refill_rate == 0 {
            return;
        }
        let now = self.origin.elapsed().as_nanos() as u64;
        let last = self.last_refill.load(Ordering::SeqCst);
        let elapsed_ns = now.saturating_sub(last) as u128;

        let rate = self.refill_rate as u128;
        let tokens_to_add = elapsed_ns * rate / NANOS_PER_SEC;
        if tokens_to_add == 0 {
            return;
        }
        // only the time those tokens account for is spent, the remainder carries over
        let spent_ns = (tokens_to_add * NANOS_PER_SEC / rate) as u64;
        if self
            .last_refill
            .compare_exchange(last, last + spent_ns, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // another caller won the refill
            return;
        }

        let tokens_to_add = u64::try_from(tokens_to_add).unwrap_or(u64::MAX);
        let mut current = self.tokens.load(Ordering::SeqCst);
        loop {
            let next = current.saturating_add(tokens_to_add).min(self.max_tokens);
            match self
                .tokens
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }
}

/// One bucket per caller, created on first submission. At most `capacity`
/// callers are tracked; the least recently seen one is evicted first.
pub struct CallerLimits {
    buckets: Mutex<LruCache<Address, RateLimiter>>,
    rate: u64,
    burst: u64,
}

impl CallerLimits {
    pub fn new(rate: u64, burst: u64, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            buckets: Mutex::new(LruCache::new(capacity)),
            rate,
            burst,
        }
    }

    pub fn check(&self, caller: &Address) -> bool {
        self.buckets
            .lock()
            .get_or_insert(*caller, || RateLimiter::new(self.rate, self.burst))
            .check_and_consume()
    }
}
