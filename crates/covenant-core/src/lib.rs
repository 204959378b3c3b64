//! # covenant-core — Foundational Types for the Covenant Engine
//!
//! This crate is the bedrock of the Covenant custody engine. It defines the
//! type-system primitives every other crate in the workspace builds on; it
//! depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** [`PartyId`],
//!    [`AgreementId`], [`Amount`], [`BasisPoints`] — all newtypes with
//!    validated constructors. No bare strings for identifiers, no bare
//!    integers for value.
//!
//! 2. **Checked arithmetic only.** All value math flows through
//!    [`Amount`]'s checked operations and returns
//!    [`CustodyError::ArithmeticOverflow`] on wrap. No floating point
//!    anywhere in the value path.
//!
//! 3. **Fixed rounding direction.** Basis-point fee math truncates toward
//!    zero ([`BasisPoints::apply_to`]): the fee rounds down, so rounding can
//!    never leak value away from the custodied principal.
//!
//! 4. **UTC-only, seconds-precision timestamps.** The [`Timestamp`] type
//!    carries no sub-second component; all time-gate comparisons are whole
//!    seconds against a caller-supplied [`Clock`].
//!
//! 5. **Ports as traits.** The engine never performs a transfer or reads a
//!    wall clock directly; it goes through [`ValueTransferPort`] and
//!    [`Clock`], which the hosting environment supplies.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `covenant-*` crates (leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.
//! - All public types derive `Debug` and `Clone`, and implement
//!   `Serialize`/`Deserialize`.

pub mod amount;
pub mod clock;
pub mod error;
pub mod identity;
pub mod temporal;
pub mod transfer;

// Re-export primary types for ergonomic imports.
pub use amount::{Amount, BasisPoints, FeeTerms};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CustodyError;
pub use identity::{AgreementId, PartyId};
pub use temporal::Timestamp;
pub use transfer::{TransferError, TransferInstruction, ValueTransferPort};
