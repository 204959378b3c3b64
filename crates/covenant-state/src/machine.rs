//! # The State Machine
//!
//! [`transition`] is a pure function: given an agreement, an event, the
//! authenticated caller, and the current time, it either rejects the event
//! with a precise error or produces an [`Outcome`] — the next state plus
//! the transfer instructions the ledger must execute before committing.
//!
//! ## Guard Order
//!
//! Guards are checked in a fixed order, all before any effect is computed:
//!
//! 1. **Terminal sink** — events on `Released`/`Refunded`/`Cancelled`
//!    fail `AlreadyFinalized`.
//! 2. **State** — events not legal in the current state fail
//!    `IllegalTransition`.
//! 3. **Role** — callers without the required role fail `Unauthorized`.
//! 4. **Time** — closed time gates fail `IllegalTransition`.
//!
//! `Unauthorized` and `IllegalTransition` are deliberately distinct:
//! callers need to tell "not your role" apart from "not your turn".
//!
//! ## Transition Table
//!
//! | From | Event | Guard | To |
//! |---|---|---|---|
//! | AwaitingCompletion | ConfirmCompletion | initiator (or both parties under mutual policy) | Released |
//! | AwaitingCompletion | RaiseDispute | initiator or counterparty; arbiter designated | Disputed |
//! | Active | ProcessPayment | initiator or counterparty; time gate open | Active or Released |
//! | Active | RaiseDispute | initiator or counterparty; arbiter designated | Disputed |
//! | Active | Amend | initiator; amendable kind | Active |
//! | Active | Pause | initiator; recurring kind | Paused |
//! | Active | Cancel | initiator; vesting or recurring kind | Cancelled |
//! | Paused | Resume | initiator | Active |
//! | Paused | RaiseDispute / Amend / Cancel | as above | — |
//! | Disputed | ResolveDispute | arbiter only (via the arbitration authority) | Released or Refunded |

use serde::{Deserialize, Serialize};

use covenant_core::{Amount, CustodyError, PartyId, Timestamp, TransferInstruction};
use covenant_schedule::CustodyKind;

use crate::agreement::{Agreement, Role};

// ── States ─────────────────────────────────────────────────────────────

/// The lifecycle state of an agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgreementState {
    /// One-shot custody waiting for the completion confirmation.
    AwaitingCompletion,
    /// Time-gated custody accruing toward release.
    Active,
    /// Recurring custody suspended by the initiator; time gates hold.
    Paused,
    /// A party raised a dispute; only the arbiter can exit this state.
    Disputed,
    /// All custodied value released to the counterparty. Terminal.
    Released,
    /// Custodied value returned to the initiator by dispute resolution.
    /// Terminal.
    Refunded,
    /// Custody wound down early by the initiator. Terminal.
    Cancelled,
}

impl AgreementState {
    /// The canonical string name of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingCompletion => "AWAITING_COMPLETION",
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
            Self::Disputed => "DISPUTED",
            Self::Released => "RELEASED",
            Self::Refunded => "REFUNDED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether this state is a sink (no further transitions legal).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Released | Self::Refunded | Self::Cancelled)
    }

    /// Event labels legal in this state. The centralized guard table;
    /// role and time guards apply on top.
    pub fn valid_events(&self) -> &'static [&'static str] {
        match self {
            Self::AwaitingCompletion => &["confirm_completion", "raise_dispute"],
            Self::Active => &[
                "process_payment",
                "raise_dispute",
                "amend",
                "pause",
                "cancel",
            ],
            Self::Paused => &["resume", "raise_dispute", "amend", "cancel"],
            Self::Disputed => &["resolve_dispute"],
            Self::Released | Self::Refunded | Self::Cancelled => &[],
        }
    }
}

impl std::fmt::Display for AgreementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Events ─────────────────────────────────────────────────────────────

/// Which party a dispute resolution favors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeFavor {
    /// Return the remaining custody to the initiator (refund).
    Initiator,
    /// Release the remaining custody to the counterparty.
    Counterparty,
}

/// A caller action mapped onto the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Confirm completion and release custody (escrow).
    ConfirmCompletion,
    /// Move the agreement into `Disputed`.
    RaiseDispute,
    /// Arbiter ruling that exits `Disputed`.
    ResolveDispute(DisputeFavor),
    /// Release whatever the schedule currently allows.
    ProcessPayment,
    /// Change the custodied amount of an amendable agreement.
    Amend {
        /// The new total amount.
        new_amount: Amount,
    },
    /// Suspend a recurring agreement.
    Pause,
    /// Resume a paused agreement, shifting its due times by the pause.
    Resume,
    /// Wind down a time-gated agreement early.
    Cancel,
}

impl Event {
    /// The canonical event label, matching
    /// [`AgreementState::valid_events`].
    pub fn label(&self) -> &'static str {
        match self {
            Self::ConfirmCompletion => "confirm_completion",
            Self::RaiseDispute => "raise_dispute",
            Self::ResolveDispute(_) => "resolve_dispute",
            Self::ProcessPayment => "process_payment",
            Self::Amend { .. } => "amend",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Policy ─────────────────────────────────────────────────────────────

/// Whether completion requires one confirmation or both parties'.
///
/// The source deployments disagreed on this; it is deliberately a
/// per-deployment configuration rather than an inferred behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ApprovalPolicy {
    /// The initiator's confirmation alone releases custody.
    #[default]
    Single,
    /// Both initiator and counterparty must confirm; the second distinct
    /// confirmation releases custody.
    Mutual,
}

// ── Effects ────────────────────────────────────────────────────────────

/// A pull-style credit owed to a displaced party, claimed later through
/// the ledger rather than pushed immediately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundCredit {
    /// Who may claim the credit.
    pub beneficiary: PartyId,
    /// The credited amount.
    pub amount: Amount,
}

/// Schedule bookkeeping the ledger applies on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleChange {
    /// No schedule fields change.
    None,
    /// Advance the recurring due time (by exactly one interval).
    NextPaymentAt(Timestamp),
    /// Record the pause instant.
    Paused(Timestamp),
    /// Clear the pause and shift the due time past it.
    Resumed {
        /// The shifted due time, if the kind has one.
        next_payment_at: Option<Timestamp>,
    },
}

/// The validated result of a transition: the state update and the
/// transfers the ledger must execute (in order) before committing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// State after commit.
    pub next_state: AgreementState,
    /// Transfers to execute, in order, before the commit.
    pub transfers: Vec<TransferInstruction>,
    /// Amount to add to the agreement's released total on commit.
    pub released_delta: Amount,
    /// New custodied amount, when the event was an amendment.
    pub amended_amount: Option<Amount>,
    /// Pull-style credit produced by an amendment that freed custody.
    pub refund_credit: Option<RefundCredit>,
    /// Approval to record under the mutual policy.
    pub recorded_approval: Option<PartyId>,
    /// Schedule bookkeeping to apply on commit.
    pub schedule: ScheduleChange,
    /// Canonical label for the audit log.
    pub event_label: &'static str,
}

impl Outcome {
    fn base(next_state: AgreementState, event_label: &'static str) -> Self {
        Self {
            next_state,
            transfers: Vec::new(),
            released_delta: Amount::ZERO,
            amended_amount: None,
            refund_credit: None,
            recorded_approval: None,
            schedule: ScheduleChange::None,
            event_label,
        }
    }
}

// ── Commit ─────────────────────────────────────────────────────────────

impl Agreement {
    /// Apply a validated outcome to the record.
    ///
    /// Called by the ledger only after every transfer instruction in the
    /// outcome has succeeded; the transfer step and this commit form one
    /// failure-atomic unit.
    pub fn apply_outcome(&mut self, outcome: &Outcome, now: Timestamp) -> Result<(), CustodyError> {
        let from = self.state;
        self.released = self.released.checked_add(outcome.released_delta)?;
        if let Some(new_amount) = outcome.amended_amount {
            self.amount = new_amount;
        }
        if let Some(party) = &outcome.recorded_approval {
            if !self.approvals.contains(party) {
                self.approvals.push(party.clone());
            }
        }
        match outcome.schedule {
            ScheduleChange::None => {}
            ScheduleChange::NextPaymentAt(due) => self.next_payment_at = Some(due),
            ScheduleChange::Paused(at) => self.paused_at = Some(at),
            ScheduleChange::Resumed { next_payment_at } => {
                self.paused_at = None;
                if next_payment_at.is_some() {
                    self.next_payment_at = next_payment_at;
                }
            }
        }
        self.state = outcome.next_state;
        self.record_transition(from, outcome.next_state, outcome.event_label, now);
        debug_assert!(self.released <= self.amount);
        Ok(())
    }
}

// ── Transition function ────────────────────────────────────────────────

/// Validate `event` against the agreement and produce its effects.
///
/// Pure: no ports are touched and the agreement is not mutated. The
/// ledger executes the returned transfers and then commits via
/// [`Agreement::apply_outcome`].
///
/// # Errors
///
/// See the guard order in the module documentation. All errors are
/// returned before any effect exists, so a failed transition has no side
/// effects by construction.
pub fn transition(
    agreement: &Agreement,
    event: &Event,
    caller: &PartyId,
    now: Timestamp,
    policy: ApprovalPolicy,
) -> Result<Outcome, CustodyError> {
    if agreement.state.is_terminal() {
        return Err(CustodyError::AlreadyFinalized {
            agreement_id: agreement.id.to_string(),
            state: agreement.state.as_str().to_string(),
        });
    }
    if !agreement.state.valid_events().contains(&event.label()) {
        return Err(illegal(agreement, event, "event is not legal in this state"));
    }

    let role = agreement.parties.role_of(caller);
    match event {
        Event::ConfirmCompletion => confirm_completion(agreement, caller, role, policy, event),
        Event::RaiseDispute => raise_dispute(agreement, caller, role, event),
        Event::ResolveDispute(_) => Err(illegal(
            agreement,
            event,
            "dispute resolution must go through the arbitration authority",
        )),
        Event::ProcessPayment => process_payment(agreement, caller, role, now, event),
        Event::Amend { new_amount } => amend(agreement, caller, role, *new_amount, event),
        Event::Pause => pause(agreement, caller, role, now, event),
        Event::Resume => resume(agreement, caller, role, now, event),
        Event::Cancel => cancel(agreement, caller, role, now, event),
    }
}

fn confirm_completion(
    agreement: &Agreement,
    caller: &PartyId,
    role: Option<Role>,
    policy: ApprovalPolicy,
    event: &Event,
) -> Result<Outcome, CustodyError> {
    match policy {
        ApprovalPolicy::Single => {
            if role != Some(Role::Initiator) {
                return Err(unauthorized(event, "initiator", caller, role));
            }
        }
        ApprovalPolicy::Mutual => {
            if !matches!(role, Some(Role::Initiator) | Some(Role::Counterparty)) {
                return Err(unauthorized(
                    event,
                    "initiator or counterparty",
                    caller,
                    role,
                ));
            }
            if agreement.approvals.contains(caller) {
                return Err(illegal(agreement, event, "caller already confirmed"));
            }
            let other = if *caller == agreement.parties.initiator {
                &agreement.parties.counterparty
            } else {
                &agreement.parties.initiator
            };
            if !agreement.approvals.contains(other) {
                let mut outcome = Outcome::base(agreement.state, event.label());
                outcome.recorded_approval = Some(caller.clone());
                return Ok(outcome);
            }
        }
    }
    release_to_counterparty(agreement, AgreementState::Released, event.label())
}

fn raise_dispute(
    agreement: &Agreement,
    caller: &PartyId,
    role: Option<Role>,
    event: &Event,
) -> Result<Outcome, CustodyError> {
    if !matches!(role, Some(Role::Initiator) | Some(Role::Counterparty)) {
        return Err(unauthorized(
            event,
            "initiator or counterparty",
            caller,
            role,
        ));
    }
    if agreement.parties.arbiter.is_none() {
        return Err(illegal(
            agreement,
            event,
            "no arbiter was designated at creation",
        ));
    }
    Ok(Outcome::base(AgreementState::Disputed, event.label()))
}

fn process_payment(
    agreement: &Agreement,
    caller: &PartyId,
    role: Option<Role>,
    now: Timestamp,
    event: &Event,
) -> Result<Outcome, CustodyError> {
    if !matches!(role, Some(Role::Initiator) | Some(Role::Counterparty)) {
        return Err(unauthorized(
            event,
            "initiator or counterparty",
            caller,
            role,
        ));
    }

    let releasable = agreement.schedule_state().releasable(now)?;
    if releasable.is_zero() {
        return Err(illegal(
            agreement,
            event,
            "time gate has not opened or nothing is releasable",
        ));
    }
    let remaining = agreement.remaining()?;

    match &agreement.kind {
        CustodyKind::Escrow => Err(illegal(
            agreement,
            event,
            "escrow releases through completion confirmation",
        )),
        CustodyKind::Vesting { .. } => {
            let exhausted = releasable == remaining;
            let next_state = if exhausted {
                AgreementState::Released
            } else {
                AgreementState::Active
            };
            let mut outcome = Outcome::base(next_state, event.label());
            outcome.transfers = vec![TransferInstruction {
                to: agreement.parties.counterparty.clone(),
                amount: releasable,
            }];
            outcome.released_delta = releasable;
            Ok(outcome)
        }
        CustodyKind::Recurring {
            interval_seconds, ..
        } => {
            // Advance by exactly one interval; missed intervals are not
            // caught up in a single call.
            let due = agreement.next_payment_at.ok_or_else(|| {
                illegal(agreement, event, "recurring agreement has no due time")
            })?;
            let next_due = due.plus_seconds(*interval_seconds)?;
            let exhausted = releasable == remaining;
            let next_state = if exhausted {
                AgreementState::Released
            } else {
                AgreementState::Active
            };
            let mut outcome = Outcome::base(next_state, event.label());
            outcome.transfers = vec![TransferInstruction {
                to: agreement.parties.counterparty.clone(),
                amount: releasable,
            }];
            outcome.released_delta = releasable;
            outcome.schedule = ScheduleChange::NextPaymentAt(next_due);
            Ok(outcome)
        }
        CustodyKind::InterestLock { .. } => {
            // The instruction pays principal plus interest; only the
            // principal leaves custody, the interest is drawn by the
            // transfer primitive from the hosting environment's reserve.
            let mut outcome = Outcome::base(AgreementState::Released, event.label());
            outcome.transfers = vec![TransferInstruction {
                to: agreement.parties.counterparty.clone(),
                amount: releasable,
            }];
            outcome.released_delta = remaining;
            Ok(outcome)
        }
    }
}

fn amend(
    agreement: &Agreement,
    caller: &PartyId,
    role: Option<Role>,
    new_amount: Amount,
    event: &Event,
) -> Result<Outcome, CustodyError> {
    if role != Some(Role::Initiator) {
        return Err(unauthorized(event, "initiator", caller, role));
    }
    if !agreement.kind.is_amendable() {
        return Err(illegal(
            agreement,
            event,
            "this custody kind has an immutable amount",
        ));
    }
    if new_amount.is_zero() {
        return Err(CustodyError::InvalidAmount(
            "amended amount must be positive".to_string(),
        ));
    }
    if new_amount < agreement.released {
        return Err(CustodyError::InvalidAmount(format!(
            "amended amount {new_amount} is below the {} already released",
            agreement.released
        )));
    }
    if new_amount == agreement.amount {
        return Err(CustodyError::InvalidAmount(
            "amendment must change the amount".to_string(),
        ));
    }

    let mut outcome = Outcome::base(agreement.state, event.label());
    outcome.amended_amount = Some(new_amount);
    if new_amount < agreement.amount {
        // Freed custody becomes a pull-style credit, never a push.
        outcome.refund_credit = Some(RefundCredit {
            beneficiary: agreement.parties.initiator.clone(),
            amount: agreement.amount.checked_sub(new_amount)?,
        });
    }
    Ok(outcome)
}

fn pause(
    agreement: &Agreement,
    caller: &PartyId,
    role: Option<Role>,
    now: Timestamp,
    event: &Event,
) -> Result<Outcome, CustodyError> {
    if role != Some(Role::Initiator) {
        return Err(unauthorized(event, "initiator", caller, role));
    }
    if !matches!(agreement.kind, CustodyKind::Recurring { .. }) {
        return Err(illegal(
            agreement,
            event,
            "only recurring custody can pause",
        ));
    }
    let mut outcome = Outcome::base(AgreementState::Paused, event.label());
    outcome.schedule = ScheduleChange::Paused(now);
    Ok(outcome)
}

fn resume(
    agreement: &Agreement,
    caller: &PartyId,
    role: Option<Role>,
    now: Timestamp,
    event: &Event,
) -> Result<Outcome, CustodyError> {
    if role != Some(Role::Initiator) {
        return Err(unauthorized(event, "initiator", caller, role));
    }
    let paused_at = agreement
        .paused_at
        .ok_or_else(|| illegal(agreement, event, "paused agreement has no pause instant"))?;

    // Shift the due time past the pause so paused time never counts
    // toward the interval.
    let pause_secs = now.seconds_since(paused_at);
    let next_payment_at = match agreement.next_payment_at {
        Some(due) => Some(due.plus_seconds(pause_secs)?),
        None => None,
    };
    let mut outcome = Outcome::base(AgreementState::Active, event.label());
    outcome.schedule = ScheduleChange::Resumed { next_payment_at };
    Ok(outcome)
}

fn cancel(
    agreement: &Agreement,
    caller: &PartyId,
    role: Option<Role>,
    now: Timestamp,
    event: &Event,
) -> Result<Outcome, CustodyError> {
    if role != Some(Role::Initiator) {
        return Err(unauthorized(event, "initiator", caller, role));
    }
    let remaining = agreement.remaining()?;
    match &agreement.kind {
        CustodyKind::Escrow => Err(illegal(agreement, event, "escrow cannot be cancelled")),
        CustodyKind::InterestLock { .. } => Err(illegal(
            agreement,
            event,
            "interest locks are locked until maturity",
        )),
        CustodyKind::Vesting { .. } => {
            // Vested-so-far goes to the counterparty, the rest back to
            // the initiator.
            let vested_unreleased = agreement.schedule_state().releasable(now)?;
            let refund = remaining.checked_sub(vested_unreleased)?;
            let mut outcome = Outcome::base(AgreementState::Cancelled, event.label());
            if !vested_unreleased.is_zero() {
                outcome.transfers.push(TransferInstruction {
                    to: agreement.parties.counterparty.clone(),
                    amount: vested_unreleased,
                });
            }
            if !refund.is_zero() {
                outcome.transfers.push(TransferInstruction {
                    to: agreement.parties.initiator.clone(),
                    amount: refund,
                });
            }
            outcome.released_delta = remaining;
            Ok(outcome)
        }
        CustodyKind::Recurring { .. } => {
            let mut outcome = Outcome::base(AgreementState::Cancelled, event.label());
            if !remaining.is_zero() {
                outcome.transfers.push(TransferInstruction {
                    to: agreement.parties.initiator.clone(),
                    amount: remaining,
                });
            }
            outcome.released_delta = remaining;
            Ok(outcome)
        }
    }
}

// ── Shared effect builders and error helpers ───────────────────────────

/// Build the release outcome: remaining custody to the counterparty, net
/// of the agreement's platform fee if one was configured.
pub(crate) fn release_to_counterparty(
    agreement: &Agreement,
    next_state: AgreementState,
    event_label: &'static str,
) -> Result<Outcome, CustodyError> {
    let remaining = agreement.remaining()?;
    let mut outcome = Outcome::base(next_state, event_label);
    let net = match &agreement.fee {
        Some(fee) => {
            let (fee_amount, net) = fee.split(remaining)?;
            if !fee_amount.is_zero() {
                outcome.transfers.push(TransferInstruction {
                    to: fee.collector.clone(),
                    amount: fee_amount,
                });
            }
            net
        }
        None => remaining,
    };
    if !net.is_zero() {
        outcome.transfers.push(TransferInstruction {
            to: agreement.parties.counterparty.clone(),
            amount: net,
        });
    }
    outcome.released_delta = remaining;
    Ok(outcome)
}

fn unauthorized(
    event: &Event,
    required: &str,
    caller: &PartyId,
    role: Option<Role>,
) -> CustodyError {
    CustodyError::Unauthorized {
        event: event.label().to_string(),
        required: required.to_string(),
        caller: caller.to_string(),
        actual: role.map(|r| r.as_str().to_string()).unwrap_or_else(|| "none".to_string()),
    }
}

fn illegal(agreement: &Agreement, event: &Event, reason: &str) -> CustodyError {
    CustodyError::IllegalTransition {
        state: agreement.state.as_str().to_string(),
        event: event.label().to_string(),
        reason: reason.to_string(),
    }
}
