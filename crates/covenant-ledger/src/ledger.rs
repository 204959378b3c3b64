//! # The Custody Ledger
//!
//! [`CustodyLedger`] owns every agreement and the two ports — value
//! transfer and clock — and is the only component that mutates state.
//! The flow for every caller event is the same:
//!
//! 1. look up the agreement and take its per-agreement lock;
//! 2. validate the event through the state machine (or the arbitration
//!    authority for dispute rulings), producing an [`Outcome`];
//! 3. execute the outcome's transfer instructions against the port;
//! 4. commit the state update, append the audit record, and settle the
//!    held-balance bookkeeping.
//!
//! A failure at step 2 mutates nothing. A failure at step 3 aborts step 4,
//! so the agreement stays exactly as it was and the event is retryable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, warn};

use covenant_arbitration::ArbitrationAuthority;
use covenant_core::{
    AgreementId, Amount, Clock, CustodyError, PartyId, ValueTransferPort,
};
use covenant_schedule::CustodyKind;
use covenant_state::{transition, Agreement, AgreementState, Event, Outcome, Parties};

use crate::config::LedgerConfig;

/// The concurrent agreement store and transition executor.
///
/// Generic over the value-transfer port and the clock so production and
/// tests differ only in what they plug in.
pub struct CustodyLedger<P, C> {
    port: P,
    clock: C,
    config: LedgerConfig,
    arbitration: ArbitrationAuthority,
    agreements: DashMap<AgreementId, Arc<Mutex<Agreement>>>,
    by_party: DashMap<PartyId, Vec<AgreementId>>,
    pending_refunds: DashMap<PartyId, Amount>,
    held: Mutex<Amount>,
    next_id: AtomicU64,
}

impl<P, C> CustodyLedger<P, C>
where
    P: ValueTransferPort,
    C: Clock,
{
    /// Create an empty ledger over the given ports and configuration.
    pub fn new(port: P, clock: C, config: LedgerConfig) -> Self {
        let arbitration = ArbitrationAuthority::new(config.arbitration_fee.clone());
        Self {
            port,
            clock,
            config,
            arbitration,
            agreements: DashMap::new(),
            by_party: DashMap::new(),
            pending_refunds: DashMap::new(),
            held: Mutex::new(Amount::ZERO),
            next_id: AtomicU64::new(1),
        }
    }

    /// The underlying value-transfer port.
    pub fn port(&self) -> &P {
        &self.port
    }

    // ── Agreement creation ─────────────────────────────────────────────

    /// Open a new agreement, taking `amount` into custody.
    ///
    /// The call carries the initiator's deposit: creation and taking
    /// custody are one atomic step. Identifiers are assigned from a
    /// monotonic sequence and never reused, even after the agreement
    /// terminates.
    ///
    /// # Errors
    ///
    /// Returns the underlying validation error for coinciding parties, a
    /// zero amount, or malformed schedule parameters. Nothing is stored
    /// on error.
    pub fn open_agreement(
        &self,
        initiator: PartyId,
        counterparty: PartyId,
        arbiter: Option<PartyId>,
        kind: CustodyKind,
        amount: Amount,
    ) -> Result<AgreementId, CustodyError> {
        let parties = Parties::new(initiator, counterparty, arbiter)?;
        let members: Vec<PartyId> = parties.all().into_iter().cloned().collect();
        let id = AgreementId::from_sequence(self.next_id.fetch_add(1, Ordering::Relaxed));
        let agreement = Agreement::open(
            id,
            parties,
            kind,
            amount,
            self.config.platform_fee.clone(),
            self.clock.now(),
        )?;

        {
            let mut held = self.held.lock();
            *held = held.checked_add(amount)?;
        }
        for member in members {
            self.by_party.entry(member).or_default().push(id);
        }
        info!(
            agreement_id = %id,
            kind = agreement.kind.as_str(),
            %amount,
            state = agreement.state.as_str(),
            "agreement opened"
        );
        self.agreements.insert(id, Arc::new(Mutex::new(agreement)));
        Ok(id)
    }

    // ── Event application ──────────────────────────────────────────────

    /// Apply a caller event to an agreement.
    ///
    /// Dispute rulings route through the arbitration authority; every
    /// other event goes through the state machine. The returned outcome
    /// is the committed one — its transfers have all been executed.
    ///
    /// # Errors
    ///
    /// Guard rejections (`Unauthorized`, `IllegalTransition`,
    /// `AlreadyFinalized`, `InvalidAmount`) leave the agreement untouched.
    /// [`CustodyError::TransferFailed`] also leaves it untouched and is
    /// the only retryable kind.
    pub fn apply(
        &self,
        id: AgreementId,
        event: &Event,
        caller: &PartyId,
    ) -> Result<Outcome, CustodyError> {
        let entry = self.entry(id)?;
        let mut agreement = entry.lock();
        let now = self.clock.now();

        let outcome = match event {
            Event::ResolveDispute(favor) => self.arbitration.resolve(&agreement, caller, *favor)?,
            _ => transition(&agreement, event, caller, now, self.config.approval_policy)?,
        };

        for instruction in &outcome.transfers {
            if let Err(err) = self.port.send(&instruction.to, instruction.amount) {
                warn!(
                    agreement_id = %id,
                    instruction = %instruction,
                    error = %err,
                    "transfer failed, transition aborted"
                );
                return Err(CustodyError::TransferFailed(err));
            }
        }

        let previous_amount = agreement.amount;
        agreement.apply_outcome(&outcome, now)?;
        {
            let mut held = self.held.lock();
            *held = held.checked_sub(outcome.released_delta)?;
            if let Some(new_amount) = outcome.amended_amount {
                if new_amount > previous_amount {
                    // An upward amendment carries a fresh deposit.
                    *held = held.checked_add(new_amount.checked_sub(previous_amount)?)?;
                }
                // A downward amendment keeps the freed value in custody
                // as a pending refund until claimed.
            }
        }
        if let Some(credit) = &outcome.refund_credit {
            let mut pending = self
                .pending_refunds
                .entry(credit.beneficiary.clone())
                .or_insert(Amount::ZERO);
            *pending = pending.checked_add(credit.amount)?;
        }

        info!(
            agreement_id = %id,
            event = outcome.event_label,
            caller = %caller,
            state = outcome.next_state.as_str(),
            released = %outcome.released_delta,
            "transition committed"
        );
        Ok(outcome)
    }

    // ── Pending refunds ────────────────────────────────────────────────

    /// Pay out every refund credit owed to `caller`.
    ///
    /// Returns the claimed amount; zero when nothing was pending. On a
    /// port failure the credit is restored in full and the claim is
    /// retryable.
    pub fn claim_refunds(&self, caller: &PartyId) -> Result<Amount, CustodyError> {
        let Some((beneficiary, amount)) = self.pending_refunds.remove(caller) else {
            return Ok(Amount::ZERO);
        };
        if let Err(err) = self.port.send(caller, amount) {
            warn!(party = %caller, %amount, error = %err, "refund claim failed, credit restored");
            let mut pending = self
                .pending_refunds
                .entry(beneficiary)
                .or_insert(Amount::ZERO);
            *pending = pending.checked_add(amount)?;
            return Err(CustodyError::TransferFailed(err));
        }
        {
            let mut held = self.held.lock();
            *held = held.checked_sub(amount)?;
        }
        info!(party = %caller, %amount, "refund claimed");
        Ok(amount)
    }

    /// The refund credit currently owed to `party`.
    pub fn pending_refund(&self, party: &PartyId) -> Amount {
        self.pending_refunds
            .get(party)
            .map(|r| *r.value())
            .unwrap_or(Amount::ZERO)
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// A point-in-time snapshot of an agreement.
    pub fn agreement(&self, id: AgreementId) -> Result<Agreement, CustodyError> {
        Ok(self.entry(id)?.lock().clone())
    }

    /// Every agreement id on which `party` holds a role, in creation
    /// order. Terminal agreements stay listed.
    pub fn agreements_for_party(&self, party: &PartyId) -> Vec<AgreementId> {
        self.by_party
            .get(party)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    /// The amount a `ProcessPayment` (or completion confirmation) would
    /// release right now. Zero for paused, disputed, and terminal
    /// agreements.
    pub fn releasable_amount(&self, id: AgreementId) -> Result<Amount, CustodyError> {
        let entry = self.entry(id)?;
        let agreement = entry.lock();
        match agreement.state {
            AgreementState::Active | AgreementState::AwaitingCompletion => {
                agreement.schedule_state().releasable(self.clock.now())
            }
            _ => Ok(Amount::ZERO),
        }
    }

    /// Whether a recurring installment is currently due.
    pub fn is_payment_due(&self, id: AgreementId) -> Result<bool, CustodyError> {
        let entry = self.entry(id)?;
        let agreement = entry.lock();
        Ok(agreement.state == AgreementState::Active
            && agreement.schedule_state().is_payment_due(self.clock.now()))
    }

    /// Seconds until the agreement's next schedule event, if it has one.
    /// `None` for non-time-gated, paused, disputed, and terminal
    /// agreements.
    pub fn time_until_next_event(&self, id: AgreementId) -> Result<Option<u64>, CustodyError> {
        let entry = self.entry(id)?;
        let agreement = entry.lock();
        if agreement.state != AgreementState::Active {
            return Ok(None);
        }
        Ok(agreement.schedule_state().time_until_next_event(self.clock.now()))
    }

    /// Total value currently in custody: the sum over live agreements of
    /// their unreleased amount, plus unclaimed refund credits.
    pub fn held_balance(&self) -> Amount {
        *self.held.lock()
    }

    fn entry(&self, id: AgreementId) -> Result<Arc<Mutex<Agreement>>, CustodyError> {
        self.agreements
            .get(&id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| CustodyError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FlakyPort, RecordingPort};
    use covenant_core::{ManualClock, Timestamp};

    fn party(name: &str) -> PartyId {
        PartyId::new(name).unwrap()
    }

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_epoch_secs(secs).unwrap()
    }

    fn ledger() -> (CustodyLedger<RecordingPort, ManualClock>, ManualClock) {
        let clock = ManualClock::starting_at(ts(0));
        let ledger = CustodyLedger::new(RecordingPort::new(), clock.clone(), LedgerConfig::default());
        (ledger, clock)
    }

    fn open_escrow(ledger: &CustodyLedger<RecordingPort, ManualClock>, amount: u128) -> AgreementId {
        ledger
            .open_agreement(
                party("alice"),
                party("bob"),
                Some(party("carol")),
                CustodyKind::Escrow,
                Amount::new(amount),
            )
            .unwrap()
    }

    // ---- creation ----

    #[test]
    fn ids_are_monotonic_and_distinct() {
        let (ledger, _clock) = ledger();
        let a = open_escrow(&ledger, 100);
        let b = open_escrow(&ledger, 200);
        assert!(b.sequence() > a.sequence());
        assert_eq!(ledger.agreement(a).unwrap().amount, Amount::new(100));
        assert_eq!(ledger.agreement(b).unwrap().amount, Amount::new(200));
    }

    #[test]
    fn opening_takes_custody() {
        let (ledger, _clock) = ledger();
        open_escrow(&ledger, 100);
        open_escrow(&ledger, 250);
        assert_eq!(ledger.held_balance(), Amount::new(350));
        // Nothing has moved out yet.
        assert_eq!(ledger.port().total_sent(), 0);
    }

    #[test]
    fn invalid_agreements_store_nothing() {
        let (ledger, _clock) = ledger();
        let result = ledger.open_agreement(
            party("alice"),
            party("alice"),
            None,
            CustodyKind::Escrow,
            Amount::new(100),
        );
        assert!(matches!(result, Err(CustodyError::InvalidParty(_))));
        assert_eq!(ledger.held_balance(), Amount::ZERO);
        assert!(ledger.agreements_for_party(&party("alice")).is_empty());
    }

    #[test]
    fn party_index_includes_every_role() {
        let (ledger, _clock) = ledger();
        let id = open_escrow(&ledger, 100);
        for name in ["alice", "bob", "carol"] {
            assert_eq!(ledger.agreements_for_party(&party(name)), vec![id]);
        }
        assert!(ledger.agreements_for_party(&party("mallory")).is_empty());
    }

    // ---- event flow ----

    #[test]
    fn confirmed_escrow_pays_counterparty_and_releases_custody() {
        let (ledger, _clock) = ledger();
        let id = open_escrow(&ledger, 100);
        ledger
            .apply(id, &Event::ConfirmCompletion, &party("alice"))
            .unwrap();
        assert_eq!(ledger.port().total_to(&party("bob")), 100);
        assert_eq!(ledger.held_balance(), Amount::ZERO);
        assert_eq!(
            ledger.agreement(id).unwrap().state,
            AgreementState::Released
        );
    }

    #[test]
    fn unknown_agreement_is_not_found() {
        let (ledger, _clock) = ledger();
        let result = ledger.apply(
            AgreementId::from_sequence(99),
            &Event::ConfirmCompletion,
            &party("alice"),
        );
        assert!(matches!(result, Err(CustodyError::NotFound(_))));
    }

    #[test]
    fn dispute_rulings_route_through_the_authority() {
        let (ledger, _clock) = ledger();
        let id = open_escrow(&ledger, 100);
        ledger.apply(id, &Event::RaiseDispute, &party("bob")).unwrap();

        // A party cannot rule, even in the Disputed state.
        let result = ledger.apply(
            id,
            &Event::ResolveDispute(covenant_state::DisputeFavor::Initiator),
            &party("alice"),
        );
        assert!(matches!(result, Err(CustodyError::Unauthorized { .. })));

        ledger
            .apply(
                id,
                &Event::ResolveDispute(covenant_state::DisputeFavor::Initiator),
                &party("carol"),
            )
            .unwrap();
        assert_eq!(ledger.port().total_to(&party("alice")), 100);
        assert_eq!(
            ledger.agreement(id).unwrap().state,
            AgreementState::Refunded
        );
        assert_eq!(ledger.held_balance(), Amount::ZERO);
    }

    #[test]
    fn failed_transfer_leaves_agreement_retryable() {
        let clock = ManualClock::starting_at(ts(0));
        let ledger = CustodyLedger::new(
            FlakyPort::failing(1),
            clock.clone(),
            LedgerConfig::default(),
        );
        let id = ledger
            .open_agreement(
                party("alice"),
                party("bob"),
                None,
                CustodyKind::Escrow,
                Amount::new(100),
            )
            .unwrap();

        let result = ledger.apply(id, &Event::ConfirmCompletion, &party("alice"));
        assert!(matches!(result, Err(CustodyError::TransferFailed(_))));
        assert!(result.unwrap_err().is_retryable());

        // Nothing committed: still awaiting completion, custody intact.
        let snapshot = ledger.agreement(id).unwrap();
        assert_eq!(snapshot.state, AgreementState::AwaitingCompletion);
        assert_eq!(snapshot.released, Amount::ZERO);
        assert!(snapshot.transition_log.is_empty());
        assert_eq!(ledger.held_balance(), Amount::new(100));

        // The retry succeeds once the backend recovers.
        ledger
            .apply(id, &Event::ConfirmCompletion, &party("alice"))
            .unwrap();
        assert_eq!(ledger.port().recorder.total_to(&party("bob")), 100);
        assert_eq!(ledger.held_balance(), Amount::ZERO);
    }

    // ---- schedule queries ----

    #[test]
    fn recurring_flow_through_the_ledger() {
        let (ledger, clock) = ledger();
        let id = ledger
            .open_agreement(
                party("alice"),
                party("bob"),
                None,
                CustodyKind::Recurring {
                    interval_seconds: 30,
                    amount_per_interval: Amount::new(100),
                },
                Amount::new(250),
            )
            .unwrap();

        assert!(!ledger.is_payment_due(id).unwrap());
        assert_eq!(ledger.time_until_next_event(id).unwrap(), Some(30));
        assert_eq!(ledger.releasable_amount(id).unwrap(), Amount::ZERO);

        clock.advance(30);
        assert!(ledger.is_payment_due(id).unwrap());
        assert_eq!(ledger.releasable_amount(id).unwrap(), Amount::new(100));

        ledger.apply(id, &Event::ProcessPayment, &party("bob")).unwrap();
        assert_eq!(ledger.held_balance(), Amount::new(150));
        assert!(!ledger.is_payment_due(id).unwrap());

        clock.advance(30);
        ledger.apply(id, &Event::ProcessPayment, &party("bob")).unwrap();
        clock.advance(30);
        ledger.apply(id, &Event::ProcessPayment, &party("bob")).unwrap();
        assert_eq!(ledger.port().total_to(&party("bob")), 250);
        assert_eq!(ledger.held_balance(), Amount::ZERO);
        assert_eq!(
            ledger.agreement(id).unwrap().state,
            AgreementState::Released
        );
    }

    #[test]
    fn paused_agreement_reports_nothing_due() {
        let (ledger, clock) = ledger();
        let id = ledger
            .open_agreement(
                party("alice"),
                party("bob"),
                None,
                CustodyKind::Recurring {
                    interval_seconds: 30,
                    amount_per_interval: Amount::new(100),
                },
                Amount::new(1000),
            )
            .unwrap();
        clock.advance(10);
        ledger.apply(id, &Event::Pause, &party("alice")).unwrap();
        clock.advance(100);
        assert!(!ledger.is_payment_due(id).unwrap());
        assert_eq!(ledger.releasable_amount(id).unwrap(), Amount::ZERO);
        assert_eq!(ledger.time_until_next_event(id).unwrap(), None);
    }

    // ---- refund credits ----

    #[test]
    fn amend_down_credits_and_claim_pays() {
        let (ledger, _clock) = ledger();
        let id = ledger
            .open_agreement(
                party("alice"),
                party("bob"),
                None,
                CustodyKind::Recurring {
                    interval_seconds: 30,
                    amount_per_interval: Amount::new(100),
                },
                Amount::new(1000),
            )
            .unwrap();

        ledger
            .apply(
                id,
                &Event::Amend {
                    new_amount: Amount::new(600),
                },
                &party("alice"),
            )
            .unwrap();
        // Freed value stays in custody until claimed.
        assert_eq!(ledger.pending_refund(&party("alice")), Amount::new(400));
        assert_eq!(ledger.held_balance(), Amount::new(1000));
        assert_eq!(ledger.port().total_sent(), 0);

        let claimed = ledger.claim_refunds(&party("alice")).unwrap();
        assert_eq!(claimed, Amount::new(400));
        assert_eq!(ledger.pending_refund(&party("alice")), Amount::ZERO);
        assert_eq!(ledger.held_balance(), Amount::new(600));
        assert_eq!(ledger.port().total_to(&party("alice")), 400);

        // A second claim finds nothing.
        assert_eq!(
            ledger.claim_refunds(&party("alice")).unwrap(),
            Amount::ZERO
        );
    }

    #[test]
    fn amend_up_raises_held_balance() {
        let (ledger, _clock) = ledger();
        let id = ledger
            .open_agreement(
                party("alice"),
                party("bob"),
                None,
                CustodyKind::Recurring {
                    interval_seconds: 30,
                    amount_per_interval: Amount::new(100),
                },
                Amount::new(1000),
            )
            .unwrap();
        ledger
            .apply(
                id,
                &Event::Amend {
                    new_amount: Amount::new(1500),
                },
                &party("alice"),
            )
            .unwrap();
        assert_eq!(ledger.held_balance(), Amount::new(1500));
    }

    #[test]
    fn failed_refund_claim_restores_the_credit() {
        let clock = ManualClock::starting_at(ts(0));
        let ledger = CustodyLedger::new(
            FlakyPort::failing(1),
            clock.clone(),
            LedgerConfig::default(),
        );
        let id = ledger
            .open_agreement(
                party("alice"),
                party("bob"),
                None,
                CustodyKind::Recurring {
                    interval_seconds: 30,
                    amount_per_interval: Amount::new(100),
                },
                Amount::new(1000),
            )
            .unwrap();
        ledger
            .apply(
                id,
                &Event::Amend {
                    new_amount: Amount::new(600),
                },
                &party("alice"),
            )
            .unwrap();

        let result = ledger.claim_refunds(&party("alice"));
        assert!(matches!(result, Err(CustodyError::TransferFailed(_))));
        assert_eq!(ledger.pending_refund(&party("alice")), Amount::new(400));
        assert_eq!(ledger.held_balance(), Amount::new(1000));

        assert_eq!(
            ledger.claim_refunds(&party("alice")).unwrap(),
            Amount::new(400)
        );
        assert_eq!(ledger.held_balance(), Amount::new(600));
    }

    // ---- fees ----

    #[test]
    fn platform_fee_applies_at_completion() {
        use covenant_core::{BasisPoints, FeeTerms};
        let clock = ManualClock::starting_at(ts(0));
        let config = LedgerConfig {
            platform_fee: Some(FeeTerms {
                basis_points: BasisPoints::new(100).unwrap(), // 1%
                collector: party("platform"),
            }),
            ..LedgerConfig::default()
        };
        let ledger = CustodyLedger::new(RecordingPort::new(), clock, config);
        let id = ledger
            .open_agreement(
                party("alice"),
                party("bob"),
                None,
                CustodyKind::Escrow,
                Amount::new(10_000),
            )
            .unwrap();
        ledger
            .apply(id, &Event::ConfirmCompletion, &party("alice"))
            .unwrap();
        assert_eq!(ledger.port().total_to(&party("platform")), 100);
        assert_eq!(ledger.port().total_to(&party("bob")), 9_900);
        assert_eq!(ledger.held_balance(), Amount::ZERO);
    }
}
