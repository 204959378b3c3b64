//! # The Arbitration Authority
//!
//! Holds the deployment's resolution-fee terms and rules on disputed
//! agreements. Only the arbiter stored on the agreement at creation may
//! rule; the arbiter set is never consulted globally, so compromising the
//! authority's configuration cannot redirect a ruling to a different
//! arbiter.

use tracing::info;

use covenant_core::{Amount, CustodyError, FeeTerms, PartyId, TransferInstruction};
use covenant_state::{
    Agreement, AgreementState, DisputeFavor, Outcome, Role, ScheduleChange,
};

/// Resolves disputes on custody agreements.
///
/// Constructed once per deployment with the resolution-fee terms; rulings
/// are pure and thread-safe, so one authority serves every agreement.
#[derive(Debug, Clone)]
pub struct ArbitrationAuthority {
    fee: Option<FeeTerms>,
}

impl ArbitrationAuthority {
    /// Create an authority with the given resolution-fee terms.
    ///
    /// `None` means arbitration is free: the full remaining custody goes
    /// to the favored party.
    pub fn new(fee: Option<FeeTerms>) -> Self {
        Self { fee }
    }

    /// Rule on a disputed agreement.
    ///
    /// The ruling awards the remaining custody, net of the resolution
    /// fee, to the favored party: the counterparty on a release, the
    /// initiator on a refund. The fee is computed from the agreement's
    /// full amount but capped at what actually remains in custody, so a
    /// late dispute on a mostly-released agreement can never make the fee
    /// exceed the pot.
    ///
    /// # Errors
    ///
    /// - [`CustodyError::AlreadyFinalized`] if the agreement is terminal.
    /// - [`CustodyError::IllegalTransition`] if it is not in `Disputed`.
    /// - [`CustodyError::Unauthorized`] if `caller` is not the designated
    ///   arbiter.
    pub fn resolve(
        &self,
        agreement: &Agreement,
        caller: &PartyId,
        favor: DisputeFavor,
    ) -> Result<Outcome, CustodyError> {
        if agreement.state.is_terminal() {
            return Err(CustodyError::AlreadyFinalized {
                agreement_id: agreement.id.to_string(),
                state: agreement.state.as_str().to_string(),
            });
        }
        if agreement.state != AgreementState::Disputed {
            return Err(CustodyError::IllegalTransition {
                state: agreement.state.as_str().to_string(),
                event: "resolve_dispute".to_string(),
                reason: "only disputed agreements can be resolved".to_string(),
            });
        }
        let arbiter = agreement.parties.arbiter.as_ref().ok_or_else(|| {
            CustodyError::IllegalTransition {
                state: agreement.state.as_str().to_string(),
                event: "resolve_dispute".to_string(),
                reason: "no arbiter was designated at creation".to_string(),
            }
        })?;
        if caller != arbiter {
            let actual = agreement
                .parties
                .role_of(caller)
                .map(|r| r.as_str())
                .unwrap_or("none");
            return Err(CustodyError::Unauthorized {
                event: "resolve_dispute".to_string(),
                required: "arbiter".to_string(),
                caller: caller.to_string(),
                actual: actual.to_string(),
            });
        }

        let remaining = agreement.remaining()?;
        let mut transfers = Vec::new();

        let fee_amount = match &self.fee {
            Some(terms) => {
                let raw = terms.basis_points.apply_to(agreement.amount)?;
                let capped = raw.min(remaining);
                if !capped.is_zero() {
                    transfers.push(TransferInstruction {
                        to: terms.collector.clone(),
                        amount: capped,
                    });
                }
                capped
            }
            None => Amount::ZERO,
        };
        let awarded = remaining.checked_sub(fee_amount)?;

        let (beneficiary, next_state) = match favor {
            DisputeFavor::Counterparty => {
                (&agreement.parties.counterparty, AgreementState::Released)
            }
            DisputeFavor::Initiator => (&agreement.parties.initiator, AgreementState::Refunded),
        };
        if !awarded.is_zero() {
            transfers.push(TransferInstruction {
                to: beneficiary.clone(),
                amount: awarded,
            });
        }

        info!(
            agreement_id = %agreement.id,
            arbiter = %caller,
            outcome = next_state.as_str(),
            %awarded,
            fee = %fee_amount,
            "dispute resolved"
        );

        Ok(Outcome {
            next_state,
            transfers,
            released_delta: remaining,
            amended_amount: None,
            refund_credit: None,
            recorded_approval: None,
            schedule: ScheduleChange::None,
            event_label: "resolve_dispute",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_core::{AgreementId, BasisPoints, Timestamp};
    use covenant_schedule::CustodyKind;
    use covenant_state::{transition, ApprovalPolicy, Event, Parties};

    fn party(name: &str) -> PartyId {
        PartyId::new(name).unwrap()
    }

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_epoch_secs(secs).unwrap()
    }

    fn disputed_escrow(amount: u128) -> Agreement {
        let mut agreement = Agreement::open(
            AgreementId::from_sequence(1),
            Parties::new(party("alice"), party("bob"), Some(party("carol"))).unwrap(),
            CustodyKind::Escrow,
            Amount::new(amount),
            None,
            ts(0),
        )
        .unwrap();
        let outcome = transition(
            &agreement,
            &Event::RaiseDispute,
            &party("alice"),
            ts(1),
            ApprovalPolicy::Single,
        )
        .unwrap();
        agreement.apply_outcome(&outcome, ts(1)).unwrap();
        agreement
    }

    fn resolution_fee(bps: u16) -> Option<FeeTerms> {
        Some(FeeTerms {
            basis_points: BasisPoints::new(bps).unwrap(),
            collector: party("arb-pool"),
        })
    }

    #[test]
    fn favor_initiator_refunds_remaining() {
        let mut agreement = disputed_escrow(1000);
        let authority = ArbitrationAuthority::new(None);
        let outcome = authority
            .resolve(&agreement, &party("carol"), DisputeFavor::Initiator)
            .unwrap();
        assert_eq!(outcome.next_state, AgreementState::Refunded);
        assert_eq!(outcome.transfers.len(), 1);
        assert_eq!(outcome.transfers[0].to, party("alice"));
        assert_eq!(outcome.transfers[0].amount, Amount::new(1000));

        agreement.apply_outcome(&outcome, ts(2)).unwrap();
        assert_eq!(agreement.state, AgreementState::Refunded);
        assert_eq!(agreement.remaining().unwrap(), Amount::ZERO);
    }

    #[test]
    fn favor_counterparty_releases_remaining() {
        let agreement = disputed_escrow(1000);
        let authority = ArbitrationAuthority::new(None);
        let outcome = authority
            .resolve(&agreement, &party("carol"), DisputeFavor::Counterparty)
            .unwrap();
        assert_eq!(outcome.next_state, AgreementState::Released);
        assert_eq!(outcome.transfers[0].to, party("bob"));
        assert_eq!(outcome.transfers[0].amount, Amount::new(1000));
    }

    #[test]
    fn resolution_fee_is_deducted_from_the_award() {
        let agreement = disputed_escrow(10_000);
        let authority = ArbitrationAuthority::new(resolution_fee(250)); // 2.5%
        let outcome = authority
            .resolve(&agreement, &party("carol"), DisputeFavor::Counterparty)
            .unwrap();
        assert_eq!(outcome.transfers.len(), 2);
        assert_eq!(outcome.transfers[0].to, party("arb-pool"));
        assert_eq!(outcome.transfers[0].amount, Amount::new(250));
        assert_eq!(outcome.transfers[1].to, party("bob"));
        assert_eq!(outcome.transfers[1].amount, Amount::new(9_750));
        // The full remainder leaves custody either way.
        assert_eq!(outcome.released_delta, Amount::new(10_000));
    }

    #[test]
    fn fee_is_capped_at_remaining_custody() {
        // A recurring agreement disputed after most value was released:
        // the fee basis is the full amount, but the pot is smaller.
        let mut agreement = Agreement::open(
            AgreementId::from_sequence(2),
            Parties::new(party("alice"), party("bob"), Some(party("carol"))).unwrap(),
            CustodyKind::Recurring {
                interval_seconds: 10,
                amount_per_interval: Amount::new(9_990),
            },
            Amount::new(10_000),
            None,
            ts(0),
        )
        .unwrap();
        let pay = transition(
            &agreement,
            &Event::ProcessPayment,
            &party("bob"),
            ts(10),
            ApprovalPolicy::Single,
        )
        .unwrap();
        agreement.apply_outcome(&pay, ts(10)).unwrap();
        assert_eq!(agreement.remaining().unwrap(), Amount::new(10));

        let dispute = transition(
            &agreement,
            &Event::RaiseDispute,
            &party("alice"),
            ts(11),
            ApprovalPolicy::Single,
        )
        .unwrap();
        agreement.apply_outcome(&dispute, ts(11)).unwrap();

        // 10% of 10_000 is 1_000, but only 10 remains.
        let authority = ArbitrationAuthority::new(resolution_fee(1_000));
        let outcome = authority
            .resolve(&agreement, &party("carol"), DisputeFavor::Initiator)
            .unwrap();
        assert_eq!(outcome.transfers.len(), 1);
        assert_eq!(outcome.transfers[0].to, party("arb-pool"));
        assert_eq!(outcome.transfers[0].amount, Amount::new(10));
        assert_eq!(outcome.released_delta, Amount::new(10));
    }

    #[test]
    fn only_the_designated_arbiter_can_rule() {
        let agreement = disputed_escrow(1000);
        let authority = ArbitrationAuthority::new(None);
        for caller in ["alice", "bob", "mallory"] {
            let result =
                authority.resolve(&agreement, &party(caller), DisputeFavor::Initiator);
            assert!(
                matches!(result, Err(CustodyError::Unauthorized { .. })),
                "{caller} must not be able to rule"
            );
        }
    }

    #[test]
    fn undisputed_agreement_cannot_be_resolved() {
        let agreement = Agreement::open(
            AgreementId::from_sequence(3),
            Parties::new(party("alice"), party("bob"), Some(party("carol"))).unwrap(),
            CustodyKind::Escrow,
            Amount::new(1000),
            None,
            ts(0),
        )
        .unwrap();
        let authority = ArbitrationAuthority::new(None);
        let result = authority.resolve(&agreement, &party("carol"), DisputeFavor::Initiator);
        assert!(matches!(
            result,
            Err(CustodyError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn resolved_agreement_cannot_be_resolved_again() {
        let mut agreement = disputed_escrow(1000);
        let authority = ArbitrationAuthority::new(None);
        let outcome = authority
            .resolve(&agreement, &party("carol"), DisputeFavor::Initiator)
            .unwrap();
        agreement.apply_outcome(&outcome, ts(2)).unwrap();

        let again = authority.resolve(&agreement, &party("carol"), DisputeFavor::Counterparty);
        assert!(matches!(again, Err(CustodyError::AlreadyFinalized { .. })));
    }
}
