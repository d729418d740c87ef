use alloy_primitives::{Address, B256, U256};
use borsh::{BorshDeserialize, BorshSerialize};
use std::io;

/// Emitted after every successful state transition, in commit order.
/// Addresses, hashes and U256 values travel as raw big-endian bytes.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq)]
pub enum GuardEvent {
    GasReported {
        sequence: u64,
        base_fee: [u8; 32],
        gas_price: [u8; 32],
        reporter: [u8; 20],
        timestamp: u64,
    },
    BudgetCreated {
        budget_id: [u8; 32],
        owner: [u8; 20],
        max_gas_price: [u8; 32],
        max_total_gas: [u8; 32],
    },
    BudgetClosed {
        budget_id: [u8; 32],
    },
    SpendingRecorded {
        budget_id: [u8; 32],
        gas_used: [u8; 32],
        cost: [u8; 32],
    },
    ProfileUpdated {
        contract: [u8; 20],
        name: String,
        gas_used: [u8; 32],
        call_count: u64,
    },
    ReporterAdded {
        reporter: [u8; 20],
    },
}

pub(crate) fn word(value: U256) -> [u8; 32] {
    value.to_be_bytes::<32>()
}

pub(crate) fn addr(address: Address) -> [u8; 20] {
    address.0.0
}

pub(crate) fn hash(id: B256) -> [u8; 32] {
    id.0
}

/// Reads a word written by [`GuardEvent`] back into a `U256`.
pub fn to_u256(bytes: &[u8; 32]) -> U256 {
    U256::from_be_bytes(*bytes)
}

impl GuardEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GuardEvent::GasReported { .. } => "GasReported",
            GuardEvent::BudgetCreated { .. } => "BudgetCreated",
            GuardEvent::BudgetClosed { .. } => "BudgetClosed",
            GuardEvent::SpendingRecorded { .. } => "SpendingRecorded",
            GuardEvent::ProfileUpdated { .. } => "ProfileUpdated",
            GuardEvent::ReporterAdded { .. } => "ReporterAdded",
        }
    }
}

/// Encodes one event as a little-endian u32 length followed by its borsh body.
pub fn encode_frame(event: &GuardEvent) -> io::Result<Vec<u8>> {
    let body = borsh::to_vec(event)?;
    let len = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "event too large"))?;

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes a buffer of back-to-back frames. A truncated trailing frame is an error.
pub fn decode_frames(mut buf: &[u8]) -> io::Result<Vec<GuardEvent>> {
    let mut events = Vec::new();
    while !buf.is_empty() {
        if buf.len() < 4 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated frame header"));
        }
        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        let rest = &buf[4..];
        if rest.len() < len {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated frame body"));
        }
        events.push(borsh::from_slice(&rest[..len])?);
        buf = &rest[len..];
    }
    Ok(events)
}
