use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::budget::BudgetId;

pub type Result<T> = std::result::Result<T, GuardError>;

/// Every way an operation can be rejected. A rejected operation leaves the
/// ledgers exactly as they were.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("caller {0} is not authorized for this operation")]
    Unauthorized(Address),

    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("budget {0} already exists")]
    DuplicateBudget(BudgetId),

    #[error("budget {0} is already closed")]
    AlreadyClosed(BudgetId),

    #[error("budget {0} is closed")]
    BudgetClosed(BudgetId),

    #[error("spending {cost} exceeds remaining budget {remaining}")]
    OverBudget { cost: U256, remaining: U256 },

    #[error("invalid parameters: {0}")]
    InvalidParams(&'static str),

    #[error("gas history is empty")]
    EmptyHistory,

    #[error("no gas price has been reported yet")]
    NoGasData,

    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("gas price source unavailable: {0}")]
    SourceUnavailable(String),
}

impl GuardError {
    pub(crate) fn budget_not_found(id: BudgetId) -> Self {
        Self::NotFound {
            kind: "budget",
            key: id.to_string(),
        }
    }

    pub(crate) fn profile_not_found(contract: Address) -> Self {
        Self::NotFound {
            kind: "profile",
            key: contract.to_string(),
        }
    }
}
