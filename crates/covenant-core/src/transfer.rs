//! # Value Transfer Port
//!
//! The engine holds value in custody but never moves it itself: every
//! outbound payment goes through the [`ValueTransferPort`] supplied by the
//! hosting environment. The port contract is all-or-nothing — a call
//! either moves the full amount or moves nothing.
//!
//! Only four caller-facing actions reach this port: completion
//! confirmation, dispute resolution, scheduled payment processing, and
//! pending-refund claims. Everything else in the engine is pure state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::Amount;
use crate::identity::PartyId;

/// Error from the external value-transfer primitive.
///
/// A failed transfer moved nothing. The ledger translates any port error
/// into [`CustodyError::TransferFailed`](crate::CustodyError::TransferFailed)
/// and leaves the agreement untouched, so the caller may retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The transfer was refused (e.g. recipient account frozen).
    #[error("transfer rejected: {reason}")]
    Rejected {
        /// Why the transfer primitive refused the transfer.
        reason: String,
    },

    /// The transfer primitive is temporarily unreachable.
    #[error("transfer backend unavailable")]
    Unavailable,
}

/// Outbound payment port.
///
/// # Contract
///
/// `send` must be atomic: on `Ok(())` the full `amount` has reached `to`;
/// on `Err` nothing moved. Partial transfers are not representable.
pub trait ValueTransferPort: Send + Sync {
    /// Move `amount` from custody to `to`.
    fn send(&self, to: &PartyId, amount: Amount) -> Result<(), TransferError>;
}

/// A single transfer the state machine instructs the ledger to perform.
///
/// Produced by transitions, executed in order by the ledger before the
/// state update is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInstruction {
    /// Recipient of the payment.
    pub to: PartyId,
    /// Amount to move out of custody.
    pub amount: Amount,
}

impl std::fmt::Display for TransferInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.amount, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_error_display() {
        let err = TransferError::Rejected {
            reason: "account frozen".to_string(),
        };
        assert!(err.to_string().contains("account frozen"));
        assert_eq!(
            TransferError::Unavailable.to_string(),
            "transfer backend unavailable"
        );
    }

    #[test]
    fn instruction_display() {
        let instruction = TransferInstruction {
            to: PartyId::new("bob").unwrap(),
            amount: Amount::new(100),
        };
        assert_eq!(format!("{instruction}"), "100 -> bob");
    }
}
