//! # covenant-state — Agreement Record and State Machine
//!
//! The heart of the custody engine: the [`Agreement`] record and the pure
//! transition function that decides, for every `(state, event, role, time)`
//! combination, whether the event is legal and what effects it produces.
//!
//! - **Agreement** ([`agreement`]): the custody record — parties and their
//!   roles, the custodied amount, the release schedule position, and an
//!   append-only transition log.
//!
//! - **Machine** ([`machine`]): [`AgreementState`], [`Event`], the guard
//!   table, and [`transition`] — a pure function from
//!   `(Agreement, Event, caller, now)` to an [`Outcome`] of state update
//!   plus transfer instructions. It never touches a port and never mutates
//!   the agreement; the ledger owns commits.
//!
//! ## Design Choice: Validated Enum over Typestate
//!
//! States are a runtime-validated enum rather than typestate. Agreements
//! are stored in a map and serialized, so the state is not known at compile
//! time; and several events (`RaiseDispute`, `Amend`, `Cancel`) are legal
//! from multiple source states, which typestate would force into duplicated
//! `impl` blocks. The transition function centralizes every guard instead,
//! and the guard table is tested exhaustively per `(state, event, role)`.
//!
//! ## Terminal-Sink Invariant
//!
//! `Released`, `Refunded`, and `Cancelled` are sinks. Any event delivered
//! to a terminal agreement fails with `AlreadyFinalized` and produces zero
//! transfers — the primary defense against double payout.

pub mod agreement;
pub mod machine;

pub use agreement::{Agreement, Parties, Role, TransitionRecord};
pub use machine::{
    transition, AgreementState, ApprovalPolicy, DisputeFavor, Event, Outcome, RefundCredit,
    ScheduleChange,
};
