use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Server configuration. Every field can be overridden with a `GASGUARD_*`
/// environment variable.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Contract owner, the only address allowed to add reporters
    pub owner: Address,
    /// Reporters the owner allowlists at startup
    pub reporters: Vec<Address>,
    pub log_level: String,
    /// Token refill per second for each caller's submissions
    pub rate_per_sec: u64,
    pub burst: u64,
    /// Callers whose buckets are kept before the least recent is dropped
    pub max_tracked_callers: usize,
    /// Append-only borsh event journal; disabled when unset
    pub journal_path: Option<PathBuf>,
    pub feed_interval_ms: u64,
    pub fee_seed: u64,
    pub queue_capacity: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            owner: Address::repeat_byte(0xAA),
            reporters: vec![Address::repeat_byte(0xBB)],
            log_level: "info".to_string(),
            rate_per_sec: 10,
            burst: 20,
            max_tracked_callers: 10_000,
            journal_path: None,
            feed_interval_ms: 200,
            fee_seed: 0x5eed,
            queue_capacity: 100,
        }
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("invalid value for {key}: {raw:?}"))
}

impl GuardConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from defaults plus whatever `lookup` returns for
    /// each `GASGUARD_*` key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("GASGUARD_OWNER") {
            cfg.owner = parse("GASGUARD_OWNER", &v)?;
        }
        if let Some(v) = lookup("GASGUARD_REPORTERS") {
            cfg.reporters = v
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| parse("GASGUARD_REPORTERS", s))
                .collect::<Result<_>>()?;
        }
        if let Some(v) = lookup("GASGUARD_LOG_LEVEL") {
            parse::<Level>("GASGUARD_LOG_LEVEL", &v)?;
            cfg.log_level = v.trim().to_string();
        }
        if let Some(v) = lookup("GASGUARD_RATE_PER_SEC") {
            cfg.rate_per_sec = parse("GASGUARD_RATE_PER_SEC", &v)?;
        }
        if let Some(v) = lookup("GASGUARD_BURST") {
            cfg.burst = parse("GASGUARD_BURST", &v)?;
        }
        if let Some(v) = lookup("GASGUARD_MAX_CALLERS") {
            cfg.max_tracked_callers = parse("GASGUARD_MAX_CALLERS", &v)?;
        }
        if let Some(v) = lookup("GASGUARD_JOURNAL") {
            cfg.journal_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("GASGUARD_FEED_INTERVAL_MS") {
            cfg.feed_interval_ms = parse("GASGUARD_FEED_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("GASGUARD_FEE_SEED") {
            cfg.fee_seed = parse("GASGUARD_FEE_SEED", &v)?;
        }
        if let Some(v) = lookup("GASGUARD_QUEUE_CAPACITY") {
            cfg.queue_capacity = parse("GASGUARD_QUEUE_CAPACITY", &v)?;
        }

        if cfg.burst == 0 {
            anyhow::bail!("GASGUARD_BURST must be at least 1");
        }
        if cfg.max_tracked_callers == 0 {
            anyhow::bail!("GASGUARD_MAX_CALLERS must be at least 1");
        }
        if cfg.queue_capacity == 0 {
            anyhow::bail!("GASGUARD_QUEUE_CAPACITY must be at least 1");
        }
        Ok(cfg)
    }

    pub fn level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }

    pub fn feed_interval(&self) -> Duration {
        Duration::from_millis(self.feed_interval_ms.max(1))
    }
}
