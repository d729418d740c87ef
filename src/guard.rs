use alloy_primitives::{Address, U256};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::access::AccessControl;
use crate::budget::{Budget, BudgetCheck, BudgetId, BudgetLedger};
use crate::error::{GuardError, Result};
use crate::events::{self, GuardEvent};
use crate::history::{GasAverage, GasObservation, HistoryLedger, WindowStats};
use crate::profile::{ContractProfile, ProfileRegistry};
use crate::source::{Clock, GasPriceSource, SystemClock};

struct GuardState {
    access: AccessControl,
    history: HistoryLedger,
    budgets: BudgetLedger,
    profiles: ProfileRegistry,
}

impl GuardState {
    fn current_gas_price(&self) -> Result<U256> {
        self.history
            .latest()
            .map(|obs| obs.gas_price)
            .ok_or(GuardError::NoGasData)
    }
}

/// The oracle and spending ledger. Every mutation runs under the single
/// write guard, so read-modify-write sequences never interleave and readers
/// always see a fully applied state.
pub struct GasGuard {
    state: RwLock<GuardState>,
    source: Box<dyn GasPriceSource>,
    clock: Box<dyn Clock>,
    events: Option<mpsc::UnboundedSender<GuardEvent>>,
}

impl GasGuard {
    pub fn new(owner: Address, source: impl GasPriceSource + 'static) -> Self {
        Self {
            state: RwLock::new(GuardState {
                access: AccessControl::new(owner),
                history: HistoryLedger::new(),
                budgets: BudgetLedger::new(),
                profiles: ProfileRegistry::new(),
            }),
            source: Box::new(source),
            clock: Box::new(SystemClock),
            events: None,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Successful transitions are sent here in commit order.
    pub fn with_event_sink(mut self, sink: mpsc::UnboundedSender<GuardEvent>) -> Self {
        self.events = Some(sink);
        self
    }

    fn emit(&self, event: GuardEvent) {
        if let Some(sink) = &self.events {
            if sink.send(event).is_err() {
                debug!("event sink closed, dropping event");
            }
        }
    }

    // ---- access control ----

    pub fn owner(&self) -> Address {
        self.state.read().access.owner()
    }

    pub fn is_reporter(&self, addr: &Address) -> bool {
        self.state.read().access.is_reporter(addr)
    }

    pub fn reporters(&self) -> Vec<Address> {
        self.state.read().access.reporters().to_vec()
    }

    pub fn add_reporter(&self, caller: Address, reporter: Address) -> Result<()> {
        let mut state = self.state.write();
        if state.access.add_reporter(&caller, reporter)? {
            self.emit(GuardEvent::ReporterAdded {
                reporter: events::addr(reporter),
            });
        }
        Ok(())
    }

    // ---- gas history ----

    /// Pulls the current quote from the source and appends it. Returns the
    /// new observation's sequence number.
    pub fn report_gas(&self, caller: Address) -> Result<u64> {
        let mut state = self.state.write();
        if let Err(err) = state.access.require_reporter(&caller) {
            warn!(%caller, "gas report rejected, not a reporter");
            return Err(err);
        }

        let quote = self.source.current()?;
        let timestamp = self.clock.now();
        let obs = state
            .history
            .append(quote.base_fee, quote.gas_price, caller, timestamp);
        info!(
            sequence = obs.sequence,
            base_fee = %obs.base_fee,
            gas_price = %obs.gas_price,
            reporter = %caller,
            "gas reported"
        );

        let sequence = obs.sequence;
        self.emit(GuardEvent::GasReported {
            sequence,
            base_fee: events::word(obs.base_fee),
            gas_price: events::word(obs.gas_price),
            reporter: events::addr(caller),
            timestamp,
        });
        Ok(sequence)
    }

    /// Never-pruned history, so this always equals `history_length`.
    pub fn report_count(&self) -> u64 {
        self.state.read().history.len()
    }

    pub fn history_length(&self) -> u64 {
        self.state.read().history.len()
    }

    pub fn latest_base_fee(&self) -> Result<U256> {
        self.state
            .read()
            .history
            .latest()
            .map(|obs| obs.base_fee)
            .ok_or(GuardError::NoGasData)
    }

    pub fn latest_gas_price(&self) -> Result<U256> {
        self.state.read().current_gas_price()
    }

    pub fn observation(&self, sequence: u64) -> Option<GasObservation> {
        self.state.read().history.get(sequence).cloned()
    }

    /// `count == 0` averages the whole history.
    pub fn average_gas_price(&self, count: u64) -> Result<GasAverage> {
        self.state.read().history.average_over_last(count)
    }

    pub fn window_stats(&self, count: u64) -> Result<WindowStats> {
        self.state.read().history.window_stats(count)
    }

    pub fn estimate_cost(&self, gas_amount: U256) -> Result<U256> {
        let price = self.state.read().current_gas_price()?;
        gas_amount
            .checked_mul(price)
            .ok_or(GuardError::ArithmeticOverflow("cost estimate"))
    }

    // ---- budgets ----

    pub fn create_budget(
        &self,
        caller: Address,
        id: BudgetId,
        max_gas_price: U256,
        max_total_gas: U256,
    ) -> Result<()> {
        let mut state = self.state.write();
        state
            .budgets
            .create(caller, id, max_gas_price, max_total_gas)?;
        self.emit(GuardEvent::BudgetCreated {
            budget_id: events::hash(id),
            owner: events::addr(caller),
            max_gas_price: events::word(max_gas_price),
            max_total_gas: events::word(max_total_gas),
        });
        Ok(())
    }

    pub fn close_budget(&self, caller: Address, id: BudgetId) -> Result<()> {
        let mut state = self.state.write();
        state.budgets.close(&caller, &id)?;
        self.emit(GuardEvent::BudgetClosed {
            budget_id: events::hash(id),
        });
        Ok(())
    }

    /// Charges `gas_used` at the latest reported gas price. Only the budget
    /// owner may record spending against it.
    pub fn record_spending(&self, caller: Address, id: BudgetId, gas_used: U256) -> Result<U256> {
        let mut state = self.state.write();
        // budget checks come before the price lookup
        let budget = state.budgets.get(&id)?;
        if budget.owner != caller {
            return Err(GuardError::Unauthorized(caller));
        }
        if !budget.is_open() {
            return Err(GuardError::BudgetClosed(id));
        }
        let price = state.current_gas_price()?;
        let cost = state
            .budgets
            .record_spending(&caller, &id, gas_used, price)?;
        self.emit(GuardEvent::SpendingRecorded {
            budget_id: events::hash(id),
            gas_used: events::word(gas_used),
            cost: events::word(cost),
        });
        Ok(cost)
    }

    pub fn remaining_budget(&self, id: BudgetId) -> Result<U256> {
        self.state.read().budgets.remaining(&id)
    }

    pub fn is_within_budget(&self, id: BudgetId) -> Result<BudgetCheck> {
        let state = self.state.read();
        // unknown ids report NotFound even before any gas data exists
        state.budgets.get(&id)?;
        let price = state.current_gas_price()?;
        state.budgets.is_within_budget(&id, price)
    }

    pub fn budget(&self, id: BudgetId) -> Result<Budget> {
        self.state.read().budgets.get(&id).cloned()
    }

    // ---- profiles ----

    pub fn update_profile(
        &self,
        caller: Address,
        contract: Address,
        name: impl Into<String>,
        gas_used: U256,
    ) -> Result<()> {
        let mut state = self.state.write();
        if let Err(err) = state.access.require_reporter(&caller) {
            warn!(%caller, %contract, "profile update rejected, not a reporter");
            return Err(err);
        }

        let now = self.clock.now();
        let profile = state
            .profiles
            .update(contract, name.into(), gas_used, now)?;
        let event = GuardEvent::ProfileUpdated {
            contract: events::addr(contract),
            name: profile.name.clone(),
            gas_used: events::word(gas_used),
            call_count: profile.call_count,
        };
        self.emit(event);
        Ok(())
    }

    pub fn profile(&self, contract: Address) -> Result<ContractProfile> {
        self.state.read().profiles.get(&contract).cloned()
    }

    pub fn profile_count(&self) -> usize {
        self.state.read().profiles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetState, budget_id};
    use crate::source::{GasQuote, ManualClock, SharedQuote};
    use std::sync::Arc;

    const OWNER: Address = Address::repeat_byte(0x01);
    const REPORTER: Address = Address::repeat_byte(0x02);
    const STRANGER: Address = Address::repeat_byte(0x03);
    const CONTRACT: Address = Address::repeat_byte(0xC0);

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    fn setup() -> (GasGuard, Arc<SharedQuote>) {
        let feed = Arc::new(SharedQuote::with_quote(GasQuote::new(10, 1)));
        let guard = GasGuard::new(OWNER, feed.clone()).with_clock(ManualClock::new(1_700_000_000));
        guard.add_reporter(OWNER, REPORTER).unwrap();
        (guard, feed)
    }

    fn report(guard: &GasGuard, feed: &SharedQuote, base_fee: u64, gas_price: u64) -> u64 {
        feed.publish(GasQuote::new(base_fee, gas_price));
        guard.report_gas(REPORTER).unwrap()
    }

    #[test]
    fn test_history_counts_every_report() {
        let (guard, feed) = setup();
        for i in 0..5 {
            assert_eq!(report(&guard, &feed, 10 + i, 20 + i), i);
        }

        assert_eq!(guard.history_length(), 5);
        assert_eq!(guard.report_count(), 5);
        for seq in 0..5 {
            assert_eq!(guard.observation(seq).unwrap().sequence, seq);
        }
        assert_eq!(guard.latest_base_fee(), Ok(u(14)));
        assert_eq!(guard.latest_gas_price(), Ok(u(24)));
    }

    #[test]
    fn test_observation_carries_reporter_and_time() {
        let (guard, feed) = setup();
        report(&guard, &feed, 7, 9);
        let obs = guard.observation(0).unwrap();
        assert_eq!(obs.reporter, REPORTER);
        assert_eq!(obs.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_average_scenario() {
        let (guard, feed) = setup();
        for price in [100, 200, 300] {
            report(&guard, &feed, price, price);
        }

        assert_eq!(guard.average_gas_price(2).unwrap().gas_price, u(250));
        assert_eq!(guard.average_gas_price(10).unwrap().gas_price, u(200));
        assert_eq!(guard.average_gas_price(0).unwrap().gas_price, u(200));
    }

    #[test]
    fn test_empty_history_queries() {
        let (guard, _feed) = setup();
        assert_eq!(guard.average_gas_price(1), Err(GuardError::EmptyHistory));
        assert_eq!(guard.latest_gas_price(), Err(GuardError::NoGasData));
        assert_eq!(guard.latest_base_fee(), Err(GuardError::NoGasData));
        assert_eq!(guard.estimate_cost(u(21_000)), Err(GuardError::NoGasData));
    }

    #[test]
    fn test_estimate_cost() {
        let (guard, feed) = setup();
        report(&guard, &feed, 20, 25);
        assert_eq!(guard.estimate_cost(u(21_000)), Ok(u(525_000)));
        assert!(matches!(
            guard.estimate_cost(U256::MAX),
            Err(GuardError::ArithmeticOverflow(_))
        ));
    }

    #[test]
    fn test_failing_source_appends_nothing() {
        let (guard, feed) = setup();
        feed.clear();
        assert!(matches!(
            guard.report_gas(REPORTER),
            Err(GuardError::SourceUnavailable(_))
        ));
        assert_eq!(guard.history_length(), 0);
    }

    #[test]
    fn test_non_reporter_changes_nothing() {
        let (guard, feed) = setup();
        report(&guard, &feed, 5, 5);

        assert_eq!(guard.report_gas(STRANGER), Err(GuardError::Unauthorized(STRANGER)));
        assert_eq!(
            guard.update_profile(STRANGER, CONTRACT, "Router", u(10)),
            Err(GuardError::Unauthorized(STRANGER))
        );
        // the owner has to allowlist itself first
        assert_eq!(guard.report_gas(OWNER), Err(GuardError::Unauthorized(OWNER)));

        assert_eq!(guard.history_length(), 1);
        assert_eq!(guard.profile_count(), 0);
    }

    #[test]
    fn test_only_owner_adds_reporters() {
        let (guard, _feed) = setup();
        assert_eq!(
            guard.add_reporter(REPORTER, STRANGER),
            Err(GuardError::Unauthorized(REPORTER))
        );
        assert!(!guard.is_reporter(&STRANGER));
        assert_eq!(guard.add_reporter(OWNER, REPORTER), Ok(()));
        assert_eq!(guard.reporters(), vec![REPORTER]);
        assert_eq!(guard.owner(), OWNER);
    }

    #[test]
    fn test_budget_scenario() {
        let (guard, feed) = setup();
        report(&guard, &feed, 1, 1);
        let id = budget_id("B");
        guard.create_budget(OWNER, id, u(50), u(1000)).unwrap();

        assert_eq!(guard.record_spending(OWNER, id, u(600)), Ok(u(600)));
        assert!(matches!(
            guard.record_spending(OWNER, id, u(500)),
            Err(GuardError::OverBudget { .. })
        ));

        let budget = guard.budget(id).unwrap();
        assert_eq!(budget.spent, u(600));
        assert_eq!(guard.remaining_budget(id), Ok(u(400)));
        assert_eq!(
            guard.remaining_budget(id).unwrap() + budget.spent,
            budget.max_total_gas
        );
    }

    #[test]
    fn test_spending_uses_latest_price() {
        let (guard, feed) = setup();
        let id = budget_id("ops");
        guard.create_budget(OWNER, id, u(50), u(1000)).unwrap();
        assert_eq!(guard.record_spending(OWNER, id, u(1)), Err(GuardError::NoGasData));

        report(&guard, &feed, 3, 4);
        assert_eq!(guard.record_spending(OWNER, id, u(10)), Ok(u(40)));
        report(&guard, &feed, 3, 7);
        assert_eq!(guard.record_spending(OWNER, id, u(10)), Ok(u(70)));
        assert_eq!(guard.budget(id).unwrap().spent, u(110));
    }

    #[test]
    fn test_spending_requires_budget_owner() {
        let (guard, feed) = setup();
        report(&guard, &feed, 1, 1);
        let id = budget_id("owned");
        guard.create_budget(STRANGER, id, u(10), u(100)).unwrap();

        // neither the contract owner nor a reporter may spend someone else's budget
        for caller in [OWNER, REPORTER] {
            assert_eq!(
                guard.record_spending(caller, id, u(1)),
                Err(GuardError::Unauthorized(caller))
            );
        }
        assert_eq!(guard.record_spending(STRANGER, id, u(1)), Ok(u(1)));
    }

    #[test]
    fn test_budget_lifecycle() {
        let (guard, feed) = setup();
        report(&guard, &feed, 1, 1);
        let id = budget_id("lifecycle");
        guard.create_budget(OWNER, id, u(10), u(100)).unwrap();

        assert_eq!(guard.close_budget(STRANGER, id), Err(GuardError::Unauthorized(STRANGER)));
        assert_eq!(guard.close_budget(OWNER, id), Ok(()));
        assert_eq!(guard.close_budget(OWNER, id), Err(GuardError::AlreadyClosed(id)));
        assert_eq!(guard.record_spending(OWNER, id, u(1)), Err(GuardError::BudgetClosed(id)));
        assert_eq!(
            guard.create_budget(STRANGER, id, u(10), u(100)),
            Err(GuardError::DuplicateBudget(id))
        );
        assert_eq!(guard.budget(id).unwrap().state, BudgetState::Closed);
    }

    #[test]
    fn test_is_within_budget() {
        let (guard, feed) = setup();
        let id = budget_id("cap");
        guard.create_budget(OWNER, id, u(50), u(1000)).unwrap();
        assert_eq!(guard.is_within_budget(id), Err(GuardError::NoGasData));
        assert!(matches!(
            guard.is_within_budget(budget_id("missing")),
            Err(GuardError::NotFound { .. })
        ));

        report(&guard, &feed, 40, 50);
        let check = guard.is_within_budget(id).unwrap();
        assert!(check.within_price && check.within_total);

        report(&guard, &feed, 40, 51);
        assert!(!guard.is_within_budget(id).unwrap().within_price);
    }

    #[test]
    fn test_profile_updates() {
        let (guard, _feed) = setup();
        for gas in [5, 7, 8] {
            guard.update_profile(REPORTER, CONTRACT, "Vault", u(gas)).unwrap();
        }

        let profile = guard.profile(CONTRACT).unwrap();
        assert_eq!(profile.total_gas_used, u(20));
        assert_eq!(profile.call_count, 3);
        assert_eq!(profile.avg_gas_used, u(6));
        assert_eq!(profile.last_updated, 1_700_000_000);
        assert!(matches!(
            guard.profile(Address::repeat_byte(0xEE)),
            Err(GuardError::NotFound { kind: "profile", .. })
        ));
    }

    #[test]
    fn test_events_follow_commits() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let feed = SharedQuote::with_quote(GasQuote::new(10, 12));
        let guard = GasGuard::new(OWNER, feed)
            .with_clock(ManualClock::new(5))
            .with_event_sink(tx);

        guard.add_reporter(OWNER, REPORTER).unwrap();
        guard.add_reporter(OWNER, REPORTER).unwrap();
        guard.report_gas(REPORTER).unwrap();
        let _ = guard.report_gas(STRANGER);
        let id = budget_id("evt");
        guard.create_budget(OWNER, id, u(1), u(100)).unwrap();
        guard.record_spending(OWNER, id, u(2)).unwrap();
        let _ = guard.record_spending(OWNER, id, u(1_000));
        guard.close_budget(OWNER, id).unwrap();
        guard.update_profile(REPORTER, CONTRACT, "Router", u(9)).unwrap();

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let GuardEvent::SpendingRecorded { cost, .. } = &event {
                assert_eq!(events::to_u256(cost), u(24));
            }
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec![
                "ReporterAdded",
                "GasReported",
                "BudgetCreated",
                "SpendingRecorded",
                "BudgetClosed",
                "ProfileUpdated",
            ]
        );
    }

    #[test]
    fn test_concurrent_spending_never_overdraws() {
        let (guard, feed) = setup();
        report(&guard, &feed, 1, 1);
        let id = budget_id("contended");
        guard.create_budget(OWNER, id, u(1), u(1_000)).unwrap();

        let accepted: u64 = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        (0..50)
                            .filter(|_| guard.record_spending(OWNER, id, u(7)).is_ok())
                            .count() as u64
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        let budget = guard.budget(id).unwrap();
        assert_eq!(budget.spent, u(accepted * 7));
        assert_eq!(accepted, 1_000 / 7);
        assert!(budget.spent <= budget.max_total_gas);
    }
}
