use alloy_primitives::Address;
use std::collections::HashSet;
use tracing::{debug, info};

use crate::error::{GuardError, Result};

/// Owner plus the allowlist of addresses allowed to report gas data.
#[derive(Debug, Clone)]
pub struct AccessControl {
    owner: Address,
    reporters: HashSet<Address>,
    /// Insertion order of `reporters`
    order: Vec<Address>,
}

impl AccessControl {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            reporters: HashSet::new(),
            order: Vec::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_owner(&self, addr: &Address) -> bool {
        self.owner == *addr
    }

    /// The owner is not implicitly a reporter.
    pub fn is_reporter(&self, addr: &Address) -> bool {
        self.reporters.contains(addr)
    }

    pub fn reporters(&self) -> &[Address] {
        &self.order
    }

    pub fn require_owner(&self, caller: &Address) -> Result<()> {
        if self.is_owner(caller) {
            Ok(())
        } else {
            Err(GuardError::Unauthorized(*caller))
        }
    }

    pub fn require_reporter(&self, caller: &Address) -> Result<()> {
        if self.is_reporter(caller) {
            Ok(())
        } else {
            Err(GuardError::Unauthorized(*caller))
        }
    }

    /// Returns `true` when the address was newly added. Re-adding an existing
    /// reporter succeeds without changing anything.
    pub fn add_reporter(&mut self, caller: &Address, reporter: Address) -> Result<bool> {
        self.require_owner(caller)?;
        if reporter.is_zero() {
            return Err(GuardError::InvalidParams("reporter must not be the zero address"));
        }

        if !self.reporters.insert(reporter) {
            debug!(%reporter, "reporter already allowlisted");
            return Ok(false);
        }
        self.order.push(reporter);
        info!(%reporter, "reporter added");
        Ok(true)
    }
}
