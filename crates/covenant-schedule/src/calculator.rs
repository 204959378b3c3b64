//! # Release Calculator
//!
//! Pure functions answering "how much is releasable right now?" for every
//! custody kind. Callable by anyone; the answers never mutate anything.
//!
//! ## Rounding Invariant
//!
//! Linear vesting computes `floor(amount * elapsed / total_duration)` in
//! `u128`, truncating toward zero. The final full-duration branch returns
//! `amount - released` directly, so whatever the truncation withheld along
//! the way is swept into the last release and `releasable(T)` is exactly
//! the full amount. No rounding drift, no stranded dust.

use covenant_core::{Amount, BasisPoints, CustodyError, Timestamp};

use crate::kind::CustodyKind;

/// Linearly vested value at `elapsed_secs` after creation.
///
/// - Before the cliff: zero.
/// - At or after `total_duration_seconds`: the full `total`.
/// - In between: `floor(total * elapsed / total_duration)`.
///
/// # Errors
///
/// Returns [`CustodyError::ArithmeticOverflow`] if the intermediate
/// product overflows, or if `total_duration_seconds` is zero.
pub fn vested_amount(
    total: Amount,
    elapsed_secs: u64,
    cliff_seconds: u64,
    total_duration_seconds: u64,
) -> Result<Amount, CustodyError> {
    if elapsed_secs < cliff_seconds {
        return Ok(Amount::ZERO);
    }
    if elapsed_secs >= total_duration_seconds {
        return Ok(total);
    }
    total.mul_ratio(u128::from(elapsed_secs), u128::from(total_duration_seconds))
}

/// Simple interest on `principal`, computed once at unlock. Not
/// compounded.
///
/// # Errors
///
/// Returns [`CustodyError::ArithmeticOverflow`] if the intermediate
/// product overflows.
pub fn interest(principal: Amount, rate: BasisPoints) -> Result<Amount, CustodyError> {
    rate.apply_to(principal)
}

/// Read-only view of one agreement's schedule position.
///
/// Built by the ledger from the stored agreement; never mutated by
/// callers.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleState<'a> {
    /// The custody kind and its parameters.
    pub kind: &'a CustodyKind,
    /// Value originally placed under custody (post-amendment, if any).
    pub amount: Amount,
    /// Cumulative value already transferred out.
    pub released: Amount,
    /// When the agreement was created.
    pub created_at: Timestamp,
    /// Next due time for recurring custody, `None` otherwise.
    pub next_payment_at: Option<Timestamp>,
}

impl ScheduleState<'_> {
    /// Value a release-triggering action would move right now.
    ///
    /// For escrow this is the full remaining amount (release is gated on
    /// confirmation, not time). For an interest lock the figure includes
    /// the interest the unlock pays on top of the principal.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::ArithmeticOverflow`] if schedule arithmetic
    /// overflows.
    pub fn releasable(&self, now: Timestamp) -> Result<Amount, CustodyError> {
        let remaining = self.amount.checked_sub(self.released)?;
        match self.kind {
            CustodyKind::Escrow => Ok(remaining),
            CustodyKind::Vesting {
                cliff_seconds,
                total_duration_seconds,
            } => {
                let elapsed = now.seconds_since(self.created_at);
                if elapsed >= *total_duration_seconds {
                    // Full-release branch sweeps any truncation remainder.
                    return Ok(remaining);
                }
                let vested =
                    vested_amount(self.amount, elapsed, *cliff_seconds, *total_duration_seconds)?;
                // A downward amendment can leave the released total ahead
                // of the new, shallower vesting curve; nothing further is
                // releasable until the curve catches up.
                if vested <= self.released {
                    return Ok(Amount::ZERO);
                }
                vested.checked_sub(self.released)
            }
            CustodyKind::Recurring {
                amount_per_interval,
                ..
            } => match self.next_payment_at {
                Some(due) if now >= due => Ok(std::cmp::min(*amount_per_interval, remaining)),
                _ => Ok(Amount::ZERO),
            },
            CustodyKind::InterestLock { lock_seconds, rate } => {
                let unlock = self.created_at.plus_seconds(*lock_seconds)?;
                if now < unlock || remaining.is_zero() {
                    return Ok(Amount::ZERO);
                }
                remaining.checked_add(interest(self.amount, *rate)?)
            }
        }
    }

    /// Whether a `ProcessPayment` (or interest-lock unlock) would succeed
    /// on its time guard right now.
    pub fn is_payment_due(&self, now: Timestamp) -> bool {
        match self.kind {
            CustodyKind::Escrow => false,
            _ => self
                .releasable(now)
                .map(|amount| !amount.is_zero())
                .unwrap_or(false),
        }
    }

    /// Seconds until the next schedule event (cliff opening, next
    /// installment, or unlock). `None` for escrow and exhausted
    /// schedules; zero when the gate is already open.
    pub fn time_until_next_event(&self, now: Timestamp) -> Option<u64> {
        let remaining = self.amount.checked_sub(self.released).ok()?;
        if remaining.is_zero() {
            return None;
        }
        match self.kind {
            CustodyKind::Escrow => None,
            CustodyKind::Vesting {
                cliff_seconds,
                total_duration_seconds,
            } => {
                let elapsed = now.seconds_since(self.created_at);
                if elapsed < *cliff_seconds {
                    Some(cliff_seconds - elapsed)
                } else {
                    // Past the cliff, vesting accrues every whole second.
                    Some(0)
                }
            }
            CustodyKind::Recurring { .. } => {
                let due = self.next_payment_at?;
                Some(due.seconds_since(now))
            }
            CustodyKind::InterestLock { lock_seconds, .. } => {
                let elapsed = now.seconds_since(self.created_at);
                Some(lock_seconds.saturating_sub(elapsed))
            }
        }
    }
}
