//! # covenant-schedule — Time-Gated Release Calculation
//!
//! Computes, for the time-gated custody kinds, how much value is currently
//! releasable as a function of elapsed time. Nothing in this crate mutates
//! state: the ledger and state machine call in with a read-only view and
//! apply the answer through their own commit paths.
//!
//! - **Kind** ([`kind`]): the closed [`CustodyKind`] enumeration selecting
//!   the custody variant (escrow, vesting, recurring, interest lock) and
//!   its schedule parameters.
//!
//! - **Calculator** ([`calculator`]): the pure release math —
//!   [`vested_amount`] for linear/cliff vesting, [`interest`] for
//!   non-compounded interest locks, and [`ScheduleState`] for the
//!   per-agreement read surface (`releasable`, `is_payment_due`,
//!   `time_until_next_event`).
//!
//! ## Crate Policy
//!
//! - Integer arithmetic only, truncating toward zero; the truncation
//!   remainder is swept by the final full-release branch so no dust is
//!   ever stranded.
//! - No side effects, no clocks: callers pass the current time in.

pub mod calculator;
pub mod kind;

pub use calculator::{interest, vested_amount, ScheduleState};
pub use kind::CustodyKind;
