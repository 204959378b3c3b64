//! # Error Taxonomy — Structured Error Hierarchy
//!
//! Defines [`CustodyError`], the error type shared by every crate in the
//! workspace. All errors use `thiserror` for derive-based `Display` and
//! `Error` implementations.
//!
//! ## Design
//!
//! - Guard violations (`InvalidParty`, `InvalidAmount`, `Unauthorized`,
//!   `IllegalTransition`, `AlreadyFinalized`) are rejected before any state
//!   mutation or transfer attempt. Fail closed, no side effects.
//! - `Unauthorized` and `IllegalTransition` are distinct kinds: callers need
//!   to tell "not your role" apart from "not your turn".
//! - `TransferFailed` is the only error that can occur after a guard has
//!   passed. On it, the agreement is guaranteed to be exactly as it was
//!   before the call, so the action is safely retryable.

use thiserror::Error;

use crate::transfer::TransferError;

/// Top-level error type for the Covenant custody engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    /// Two roles on an agreement coincide, or a party identifier is
    /// malformed.
    #[error("invalid party: {0}")]
    InvalidParty(String),

    /// The amount is zero, or an amendment would drop below the amount
    /// already released.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// No agreement exists under the given identifier.
    #[error("agreement {0} not found")]
    NotFound(String),

    /// The caller holds the wrong role for this event.
    #[error("unauthorized: {event} requires {required}, caller {caller} is {actual}")]
    Unauthorized {
        /// Event that was attempted.
        event: String,
        /// Role the event requires.
        required: String,
        /// The caller's identifier.
        caller: String,
        /// The role the caller actually holds (or "none").
        actual: String,
    },

    /// The event is not legal in the agreement's current state, or a time
    /// gate has not yet opened.
    #[error("illegal transition: {event} in state {state}: {reason}")]
    IllegalTransition {
        /// Current state name.
        state: String,
        /// Event that was attempted.
        event: String,
        /// Why the transition was rejected.
        reason: String,
    },

    /// The agreement already reached a terminal state. Terminal states are
    /// sinks; this is the primary defense against double payout.
    #[error("agreement {agreement_id} already finalized in state {state}")]
    AlreadyFinalized {
        /// The finalized agreement.
        agreement_id: String,
        /// The terminal state it rests in.
        state: String,
    },

    /// The external value transfer failed. The agreement state is unchanged
    /// and the action may be retried.
    #[error("value transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    /// Integer arithmetic overflowed. Value math never wraps silently.
    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),
}

impl CustodyError {
    /// Whether this error is the post-guard transfer failure (retryable)
    /// rather than a pre-mutation guard rejection.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransferFailed(_))
    }
}
