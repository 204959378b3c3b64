//! # The Agreement Record
//!
//! One agreement governs one amount of custodied value between a fixed set
//! of parties. The record is created by the initiator's deposit, mutated
//! only through machine-validated transitions, and never physically
//! destroyed — terminal agreements stay queryable.

use serde::{Deserialize, Serialize};

use covenant_core::{Amount, AgreementId, CustodyError, FeeTerms, PartyId, Timestamp};
use covenant_schedule::{CustodyKind, ScheduleState};

use crate::machine::AgreementState;

// ── Roles ──────────────────────────────────────────────────────────────

/// The role a party holds on an agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The payer: deposits the custodied value and confirms completion.
    Initiator,
    /// The payee: receives released value.
    Counterparty,
    /// The neutral party empowered to resolve disputes.
    Arbiter,
}

impl Role {
    /// The canonical string name of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiator => "initiator",
            Self::Counterparty => "counterparty",
            Self::Arbiter => "arbiter",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Parties ────────────────────────────────────────────────────────────

/// The fixed set of parties on an agreement.
///
/// All role identifiers are pairwise distinct; the constructor enforces
/// this, so a stored `Parties` can never ambiguously resolve a caller to
/// two roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parties {
    /// The payer.
    pub initiator: PartyId,
    /// The payee.
    pub counterparty: PartyId,
    /// The dispute resolver, if one was designated at creation.
    pub arbiter: Option<PartyId>,
}

impl Parties {
    /// Create the party set, rejecting coinciding roles.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::InvalidParty`] if any two identifiers are
    /// equal.
    pub fn new(
        initiator: PartyId,
        counterparty: PartyId,
        arbiter: Option<PartyId>,
    ) -> Result<Self, CustodyError> {
        if initiator == counterparty {
            return Err(CustodyError::InvalidParty(format!(
                "initiator and counterparty coincide: {initiator}"
            )));
        }
        if let Some(arb) = &arbiter {
            if *arb == initiator || *arb == counterparty {
                return Err(CustodyError::InvalidParty(format!(
                    "arbiter coincides with another role: {arb}"
                )));
            }
        }
        Ok(Self {
            initiator,
            counterparty,
            arbiter,
        })
    }

    /// Resolve a caller to the role it holds, if any.
    pub fn role_of(&self, caller: &PartyId) -> Option<Role> {
        if *caller == self.initiator {
            Some(Role::Initiator)
        } else if *caller == self.counterparty {
            Some(Role::Counterparty)
        } else if self.arbiter.as_ref() == Some(caller) {
            Some(Role::Arbiter)
        } else {
            None
        }
    }

    /// All party identifiers on this agreement.
    pub fn all(&self) -> Vec<&PartyId> {
        let mut parties = vec![&self.initiator, &self.counterparty];
        if let Some(arb) = &self.arbiter {
            parties.push(arb);
        }
        parties
    }
}

// ── Transition Log ─────────────────────────────────────────────────────

/// A record of one state transition, kept for audit purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State before the transition.
    pub from_state: AgreementState,
    /// State after the transition.
    pub to_state: AgreementState,
    /// Canonical event label (e.g. `confirm_completion`).
    pub event: String,
    /// When the transition committed.
    pub at: Timestamp,
}

// ── Agreement ──────────────────────────────────────────────────────────

/// One custody record governing a single amount of value between parties.
///
/// ## Invariants
///
/// - `released <= amount` at all times; for one-shot kinds
///   `released ∈ {0, amount}`.
/// - `state` only changes through machine-validated transitions; terminal
///   states are sinks.
/// - The transition log is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    /// Unique, never-reused identifier.
    pub id: AgreementId,
    /// The fixed party set.
    pub parties: Parties,
    /// The custody variant and its schedule parameters.
    pub kind: CustodyKind,
    /// Value under custody (reflects amendments, if any).
    pub amount: Amount,
    /// Cumulative value already transferred out.
    pub released: Amount,
    /// Optional proportional platform fee, fixed at creation.
    pub fee: Option<FeeTerms>,
    /// Current lifecycle state.
    pub state: AgreementState,
    /// When the agreement was created.
    pub created_at: Timestamp,
    /// The single unlock instant, for vesting cliffs and interest locks.
    pub unlock_at: Option<Timestamp>,
    /// The next installment due time, for recurring custody.
    pub next_payment_at: Option<Timestamp>,
    /// When the agreement was paused, while in `Paused`.
    pub paused_at: Option<Timestamp>,
    /// Parties that have confirmed completion under the mutual policy.
    pub approvals: Vec<PartyId>,
    /// Append-only audit trail of committed transitions.
    pub transition_log: Vec<TransitionRecord>,
}

impl Agreement {
    /// Construct a new agreement from a validated deposit.
    ///
    /// The deposit call itself carries the value: creation and taking
    /// custody are one atomic step, so a constructed agreement always has
    /// its full amount in custody.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::InvalidAmount`] for a zero amount or
    /// malformed schedule parameters. Party validation happens in
    /// [`Parties::new`].
    pub fn open(
        id: AgreementId,
        parties: Parties,
        kind: CustodyKind,
        amount: Amount,
        fee: Option<FeeTerms>,
        created_at: Timestamp,
    ) -> Result<Self, CustodyError> {
        if amount.is_zero() {
            return Err(CustodyError::InvalidAmount(
                "custodied amount must be positive".to_string(),
            ));
        }
        kind.validate(amount)?;

        let state = if kind.is_time_gated() {
            AgreementState::Active
        } else {
            AgreementState::AwaitingCompletion
        };
        let unlock_at = kind.unlock_at(created_at)?;
        let next_payment_at = kind.first_payment_at(created_at)?;

        Ok(Self {
            id,
            parties,
            kind,
            amount,
            released: Amount::ZERO,
            fee,
            state,
            created_at,
            unlock_at,
            next_payment_at,
            paused_at: None,
            approvals: Vec::new(),
            transition_log: Vec::new(),
        })
    }

    /// Value still under custody for this agreement.
    pub fn remaining(&self) -> Result<Amount, CustodyError> {
        self.amount.checked_sub(self.released)
    }

    /// Whether `caller` holds any role on this agreement.
    pub fn is_party(&self, caller: &PartyId) -> bool {
        self.parties.role_of(caller).is_some()
    }

    /// Read-only schedule view for the release calculator.
    pub fn schedule_state(&self) -> ScheduleState<'_> {
        ScheduleState {
            kind: &self.kind,
            amount: self.amount,
            released: self.released,
            created_at: self.created_at,
            next_payment_at: self.next_payment_at,
        }
    }

    /// Append a transition to the audit log.
    pub(crate) fn record_transition(
        &mut self,
        from: AgreementState,
        to: AgreementState,
        event: &str,
        at: Timestamp,
    ) {
        self.transition_log.push(TransitionRecord {
            from_state: from,
            to_state: to,
            event: event.to_string(),
            at,
        });
    }
}
