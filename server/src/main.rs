mod config;
mod feed;
mod gateway;
mod journal;
mod limiter;

use alloy_primitives::{Address, U256};
use config::GuardConfig;
use feed::{FeeSimulator, run_feed};
use gas_guard::{GasGuard, GasPriceSource, SharedQuote, budget_id};
use gateway::{Gateway, Request};
use limiter::CallerLimits;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{info, warn};

const START_BASE_FEE: u128 = 30_000_000_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GuardConfig::from_env()?;
    tracing_subscriber::fmt().with_max_level(config.level()).init();
    info!(owner = %config.owner, reporters = config.reporters.len(), "starting GasGuard");

    let quote = Arc::new(SharedQuote::new());
    let feed_handle = tokio::spawn(run_feed(
        FeeSimulator::new(config.fee_seed, START_BASE_FEE),
        quote.clone(),
        config.feed_interval(),
    ));

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let journal_handle = tokio::spawn(journal::run_journal(event_rx, config.journal_path.clone()));

    let guard = Arc::new(GasGuard::new(config.owner, quote.clone()).with_event_sink(event_tx));
    let (gateway, gateway_handle) = Gateway::spawn(
        guard,
        CallerLimits::new(
            config.rate_per_sec,
            config.burst,
            config.max_tracked_callers,
        ),
        config.queue_capacity,
    );

    for reporter in &config.reporters {
        gateway
            .submit(config.owner, Request::AddReporter { reporter: *reporter })
            .await?;
    }

    // wait for the feed's first quote
    while quote.current().is_err() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    run_simulation(&gateway, &config).await?;

    drop(gateway);
    gateway_handle.await?;
    feed_handle.abort();
    let events = journal_handle.await??;
    info!(events, "Simulation finished.");
    Ok(())
}

async fn run_simulation(gateway: &Gateway, config: &GuardConfig) -> anyhow::Result<()> {
    let Some(&reporter) = config.reporters.first() else {
        warn!("no reporters configured, nothing to simulate");
        return Ok(());
    };
    let owner = config.owner;

    // 1. A few reports as the feed moves
    for _ in 0..5 {
        gateway.submit(reporter, Request::ReportGas).await?;
        tokio::time::sleep(config.feed_interval()).await;
    }
    let guard = gateway.guard();
    let avg = guard.average_gas_price(3)?;
    info!(
        reports = guard.report_count(),
        latest = %guard.latest_gas_price()?,
        avg_gas_price = %avg.gas_price,
        avg_base_fee = %avg.base_fee,
        "history"
    );

    // 2. Budget capped at 60 gwei and 0.01 ETH of gas
    let id = budget_id("my-app-budget");
    gateway
        .submit(
            owner,
            Request::CreateBudget {
                id,
                max_gas_price: U256::from(60_000_000_000u64),
                max_total_gas: U256::from(10_000_000_000_000_000u64),
            },
        )
        .await?;

    for gas_used in [21_000u64, 90_000, 150_000, 500_000] {
        let estimate = guard.estimate_cost(U256::from(gas_used))?;
        match gateway
            .submit(
                owner,
                Request::RecordSpending {
                    id,
                    gas_used: U256::from(gas_used),
                },
            )
            .await
        {
            Ok(reply) => info!(gas_used, %estimate, ?reply, "spend accepted"),
            Err(e) => warn!(gas_used, %estimate, "spend rejected: {e}"),
        }
    }
    let check = guard.is_within_budget(id)?;
    info!(
        remaining = %guard.remaining_budget(id)?,
        within_price = check.within_price,
        within_total = check.within_total,
        "budget"
    );

    // 3. Contract profiling
    let router = Address::repeat_byte(0xDD);
    for gas_used in [120_000u64, 95_000, 143_500] {
        gateway
            .submit(
                reporter,
                Request::UpdateProfile {
                    contract: router,
                    name: "UniswapV3Router".to_string(),
                    gas_used: U256::from(gas_used),
                },
            )
            .await?;
    }
    let profile = guard.profile(router)?;
    info!(
        name = %profile.name,
        avg_gas_used = %profile.avg_gas_used,
        calls = profile.call_count,
        "profile"
    );

    // 4. Unauthorized and throttled submissions are rejected without side effects
    let stranger = Address::repeat_byte(0xEE);
    if let Err(e) = gateway.submit(stranger, Request::ReportGas).await {
        warn!("stranger report rejected: {e}");
    }
    for _ in 0..=config.burst {
        if let Err(e) = gateway.submit(stranger, Request::ReportGas).await {
            warn!("{e}");
        }
    }
    info!(reports = guard.report_count(), "history unchanged by rejected reports");

    gateway.submit(owner, Request::CloseBudget { id }).await?;
    Ok(())
}
