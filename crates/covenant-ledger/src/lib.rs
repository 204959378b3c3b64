//! # covenant-ledger — The Custody Ledger
//!
//! The engine's outermost seam: a concurrent store of agreements that
//! routes caller events through the state machine (or the arbitration
//! authority), executes the resulting transfer instructions against the
//! hosting environment's [`ValueTransferPort`](covenant_core::ValueTransferPort),
//! and commits the state update only when every transfer succeeded.
//!
//! ## Concurrency Model
//!
//! Agreements live in a sharded map keyed by id, each behind its own
//! mutex. An event locks exactly one agreement for the duration of
//! validate → transfer → commit, so concurrent events on the same
//! agreement serialize (the loser of the race sees the committed state
//! and fails its guard) while events on different agreements never
//! contend. No global lock is held across a port call.
//!
//! ## Failure Atomicity
//!
//! Guards run before any effect; a guard rejection mutates nothing. A
//! port failure aborts the commit, leaving the agreement exactly as it
//! was, and surfaces as the one retryable error kind.

pub mod config;
pub mod ledger;
pub mod testing;

pub use config::LedgerConfig;
pub use ledger::CustodyLedger;
