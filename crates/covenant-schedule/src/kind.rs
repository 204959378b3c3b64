//! # Custody Kinds
//!
//! The closed enumeration of custody variants the engine supports. The
//! kind is fixed at agreement creation and selects which events are legal
//! and how the releasable amount evolves over time.

use serde::{Deserialize, Serialize};

use covenant_core::{Amount, BasisPoints, CustodyError, Timestamp};

/// The custody variant governing an agreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustodyKind {
    /// One-shot custody released in full on confirmation (or refunded in
    /// full on dispute resolution). `released ∈ {0, amount}` always.
    Escrow,

    /// Linear vesting with an optional cliff. Nothing is releasable before
    /// the cliff; between cliff and full duration the releasable amount
    /// grows as `floor(amount * elapsed / total_duration)`; at or after
    /// full duration everything remaining is releasable.
    Vesting {
        /// Seconds after creation before anything vests.
        cliff_seconds: u64,
        /// Seconds after creation at which the full amount has vested.
        total_duration_seconds: u64,
    },

    /// Interval-gated recurring payments. Each `ProcessPayment` releases
    /// one installment and advances the due time by exactly one interval —
    /// missed intervals are not caught up in a single call.
    Recurring {
        /// Seconds between due installments.
        interval_seconds: u64,
        /// Value released per installment.
        amount_per_interval: Amount,
    },

    /// Fixed-duration lock paying simple interest, computed once at
    /// unlock from the original principal. Never compounded.
    InterestLock {
        /// Seconds after creation before the principal unlocks.
        lock_seconds: u64,
        /// Simple interest rate applied to the principal at unlock.
        rate: BasisPoints,
    },
}

impl CustodyKind {
    /// The canonical string name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Escrow => "ESCROW",
            Self::Vesting { .. } => "VESTING",
            Self::Recurring { .. } => "RECURRING",
            Self::InterestLock { .. } => "INTEREST_LOCK",
        }
    }

    /// Whether release is gated on elapsed time rather than on a
    /// confirmation event.
    pub fn is_time_gated(&self) -> bool {
        !matches!(self, Self::Escrow)
    }

    /// Whether the agreement amount may be amended after creation.
    ///
    /// Only the schedule-bearing, repeatable kinds are amendable; one-shot
    /// escrow and interest locks have an immutable amount.
    pub fn is_amendable(&self) -> bool {
        matches!(self, Self::Vesting { .. } | Self::Recurring { .. })
    }

    /// Validate schedule parameters against `amount`.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::InvalidAmount`] for a zero duration or
    /// interval, a cliff past the total duration, or a per-interval
    /// amount of zero or above the custodied amount.
    pub fn validate(&self, amount: Amount) -> Result<(), CustodyError> {
        match self {
            Self::Escrow => Ok(()),
            Self::Vesting {
                cliff_seconds,
                total_duration_seconds,
            } => {
                if *total_duration_seconds == 0 {
                    return Err(CustodyError::InvalidAmount(
                        "vesting duration must be positive".to_string(),
                    ));
                }
                if cliff_seconds > total_duration_seconds {
                    return Err(CustodyError::InvalidAmount(format!(
                        "cliff ({cliff_seconds}s) exceeds total duration ({total_duration_seconds}s)"
                    )));
                }
                Ok(())
            }
            Self::Recurring {
                interval_seconds,
                amount_per_interval,
            } => {
                if *interval_seconds == 0 {
                    return Err(CustodyError::InvalidAmount(
                        "payment interval must be positive".to_string(),
                    ));
                }
                if amount_per_interval.is_zero() {
                    return Err(CustodyError::InvalidAmount(
                        "per-interval amount must be positive".to_string(),
                    ));
                }
                if *amount_per_interval > amount {
                    return Err(CustodyError::InvalidAmount(format!(
                        "per-interval amount {amount_per_interval} exceeds custodied amount {amount}"
                    )));
                }
                Ok(())
            }
            Self::InterestLock { lock_seconds, .. } => {
                if *lock_seconds == 0 {
                    return Err(CustodyError::InvalidAmount(
                        "lock duration must be positive".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    /// The instant the time gate first opens, for kinds with a single
    /// unlock point. `None` for escrow and recurring custody.
    pub fn unlock_at(&self, created_at: Timestamp) -> Result<Option<Timestamp>, CustodyError> {
        match self {
            Self::Escrow | Self::Recurring { .. } => Ok(None),
            Self::Vesting { cliff_seconds, .. } => {
                Ok(Some(created_at.plus_seconds(*cliff_seconds)?))
            }
            Self::InterestLock { lock_seconds, .. } => {
                Ok(Some(created_at.plus_seconds(*lock_seconds)?))
            }
        }
    }

    /// The first payment due time for recurring custody, `None` otherwise.
    pub fn first_payment_at(
        &self,
        created_at: Timestamp,
    ) -> Result<Option<Timestamp>, CustodyError> {
        match self {
            Self::Recurring {
                interval_seconds, ..
            } => Ok(Some(created_at.plus_seconds(*interval_seconds)?)),
            _ => Ok(None),
        }
    }
}

impl std::fmt::Display for CustodyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
