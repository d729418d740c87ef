//! Gas-price oracle and spending-control ledger.
//!
//! [`GasGuard`] owns an append-only gas price history, a budget ledger with
//! price and total caps, and per-contract gas usage profiles. Reporters feed
//! observations in through a [`GasPriceSource`]; everything else is derived.

pub mod access;
pub mod budget;
pub mod error;
pub mod events;
pub mod guard;
pub mod history;
pub mod profile;
pub mod source;

pub use budget::{Budget, BudgetCheck, BudgetId, BudgetState, budget_id};
pub use error::{GuardError, Result};
pub use events::GuardEvent;
pub use guard::GasGuard;
pub use history::{GasAverage, GasObservation, WindowStats};
pub use profile::ContractProfile;
pub use source::{Clock, GasPriceSource, GasQuote, ManualClock, SharedQuote, SystemClock};
