//! Test doubles for the value-transfer port.
//!
//! Shipped as a regular module (not `#[cfg(test)]`) so downstream
//! integration tests can drive the ledger against them.

use parking_lot::Mutex;

use covenant_core::{Amount, PartyId, TransferError, ValueTransferPort};

/// Port that accepts every transfer and records it.
#[derive(Debug, Default)]
pub struct RecordingPort {
    sent: Mutex<Vec<(PartyId, Amount)>>,
}

impl RecordingPort {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transfer accepted so far, in order.
    pub fn sent(&self) -> Vec<(PartyId, Amount)> {
        self.sent.lock().clone()
    }

    /// Total units delivered to `party` across all transfers.
    pub fn total_to(&self, party: &PartyId) -> u128 {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to == party)
            .map(|(_, amount)| amount.units())
            .sum()
    }

    /// Total units delivered to anyone.
    pub fn total_sent(&self) -> u128 {
        self.sent.lock().iter().map(|(_, a)| a.units()).sum()
    }
}

impl ValueTransferPort for RecordingPort {
    fn send(&self, to: &PartyId, amount: Amount) -> Result<(), TransferError> {
        self.sent.lock().push((to.clone(), amount));
        Ok(())
    }
}

/// Port that fails its first `n` sends, then behaves like a recorder.
///
/// With `n = u32::MAX` it is effectively a permanently-down backend.
#[derive(Debug)]
pub struct FlakyPort {
    failures_remaining: Mutex<u32>,
    /// The recorder that takes over once failures are exhausted.
    pub recorder: RecordingPort,
}

impl FlakyPort {
    /// A port whose next `n` sends fail with `Unavailable`.
    pub fn failing(n: u32) -> Self {
        Self {
            failures_remaining: Mutex::new(n),
            recorder: RecordingPort::new(),
        }
    }
}

impl ValueTransferPort for FlakyPort {
    fn send(&self, to: &PartyId, amount: Amount) -> Result<(), TransferError> {
        let mut remaining = self.failures_remaining.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(TransferError::Unavailable);
        }
        drop(remaining);
        self.recorder.send(to, amount)
    }
}
