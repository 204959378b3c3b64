//! # covenant-arbitration — Dispute Resolution
//!
//! The arbitration authority is the only exit from the `Disputed` state.
//! It verifies that the caller is the arbiter designated on the agreement
//! at creation, takes its resolution fee, and awards the rest of the
//! custodied value to whichever party the ruling favors.
//!
//! The authority never moves value itself; like the state machine, it
//! produces an [`Outcome`](covenant_state::Outcome) that the ledger
//! executes and commits as one failure-atomic unit.

pub mod authority;

pub use authority::ArbitrationAuthority;
