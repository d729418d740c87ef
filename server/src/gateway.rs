use alloy_primitives::{Address, U256};
use gas_guard::{BudgetId, GasGuard, GuardError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::limiter::CallerLimits;

/// Mutating operations. Queries go straight to [`Gateway::guard`].
#[derive(Debug, Clone)]
pub enum Request {
    ReportGas,
    CreateBudget {
        id: BudgetId,
        max_gas_price: U256,
        max_total_gas: U256,
    },
    CloseBudget {
        id: BudgetId,
    },
    RecordSpending {
        id: BudgetId,
        gas_used: U256,
    },
    UpdateProfile {
        contract: Address,
        name: String,
        gas_used: U256,
    },
    AddReporter {
        reporter: Address,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Sequence(u64),
    Cost(U256),
    Done,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("caller {0} is submitting too fast")]
    RateLimited(Address),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error("gateway is shut down")]
    Closed,
}

struct Command {
    caller: Address,
    request: Request,
    reply: oneshot::Sender<Result<Reply, GatewayError>>,
}

/// Handle to the single writer task. Submissions from every handle are
/// applied one at a time in arrival order.
#[derive(Clone)]
pub struct Gateway {
    tx: mpsc::Sender<Command>,
    guard: Arc<GasGuard>,
}

impl Gateway {
    pub fn spawn(
        guard: Arc<GasGuard>,
        limits: CallerLimits,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = tokio::spawn(run(guard.clone(), limits, rx));
        (Self { tx, guard }, handle)
    }

    pub fn guard(&self) -> &GasGuard {
        &self.guard
    }

    pub async fn submit(&self, caller: Address, request: Request) -> Result<Reply, GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command {
                caller,
                request,
                reply,
            })
            .await
            .map_err(|_| GatewayError::Closed)?;
        rx.await.map_err(|_| GatewayError::Closed)?
    }
}

async fn run(guard: Arc<GasGuard>, limits: CallerLimits, mut rx: mpsc::Receiver<Command>) {
    while let Some(Command {
        caller,
        request,
        reply,
    }) = rx.recv().await
    {
        let result = if limits.check(&caller) {
            apply(&guard, caller, request).map_err(GatewayError::from)
        } else {
            warn!(%caller, "submission throttled");
            Err(GatewayError::RateLimited(caller))
        };
        // caller may have given up waiting
        let _ = reply.send(result);
    }
    info!("gateway stopped");
}

fn apply(guard: &GasGuard, caller: Address, request: Request) -> Result<Reply, GuardError> {
    match request {
        Request::ReportGas => guard.report_gas(caller).map(Reply::Sequence),
        Request::CreateBudget {
            id,
            max_gas_price,
            max_total_gas,
        } => guard
            .create_budget(caller, id, max_gas_price, max_total_gas)
            .map(|_| Reply::Done),
        Request::CloseBudget { id } => guard.close_budget(caller, id).map(|_| Reply::Done),
        Request::RecordSpending { id, gas_used } => guard
            .record_spending(caller, id, gas_used)
            .map(Reply::Cost),
        Request::UpdateProfile {
            contract,
            name,
            gas_used,
        } => guard
            .update_profile(caller, contract, name, gas_used)
            .map(|_| Reply::Done),
        Request::AddReporter { reporter } => {
            guard.add_reporter(caller, reporter).map(|_| Reply::Done)
        }
    }
}
