//! # Amounts and Basis-Point Arithmetic
//!
//! [`Amount`] is the engine's only representation of value: an unsigned
//! 128-bit integer of indivisible units. [`BasisPoints`] carries
//! proportional rates (fees, interest) as integers in `[0, 10000]`.
//!
//! ## Security Invariant
//!
//! All value arithmetic is checked and integer-only. There is no floating
//! point in any value path, and no silent wrap: every operation that could
//! overflow returns [`CustodyError::ArithmeticOverflow`].
//!
//! Proportional math truncates toward zero. A fee of 250 bps on 10_001
//! units is 250 units, not 250.025 rounded up — the fee always rounds
//! down, so repeated fee application can never extract more than the
//! exact proportional share.

use serde::{Deserialize, Serialize};

use crate::error::CustodyError;
use crate::identity::PartyId;

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A quantity of custodied value, in indivisible units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Amount(u128);

impl Amount {
    /// The zero amount. Constructible, but rejected at agreement creation.
    pub const ZERO: Amount = Amount(0);

    /// Wrap a raw unit count.
    pub fn new(units: u128) -> Self {
        Self(units)
    }

    /// The raw unit count.
    pub fn units(&self) -> u128 {
        self.0
    }

    /// Whether this amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::ArithmeticOverflow`] on overflow.
    pub fn checked_add(self, other: Amount) -> Result<Amount, CustodyError> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or(CustodyError::ArithmeticOverflow("amount addition"))
    }

    /// Checked subtraction.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::ArithmeticOverflow`] if `other > self`.
    pub fn checked_sub(self, other: Amount) -> Result<Amount, CustodyError> {
        self.0
            .checked_sub(other.0)
            .map(Amount)
            .ok_or(CustodyError::ArithmeticOverflow("amount subtraction"))
    }

    /// `self * numerator / denominator` with checked multiply, truncating
    /// toward zero. The workhorse behind linear vesting.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::ArithmeticOverflow`] if the intermediate
    /// product overflows `u128` or `denominator` is zero.
    pub fn mul_ratio(self, numerator: u128, denominator: u128) -> Result<Amount, CustodyError> {
        if denominator == 0 {
            return Err(CustodyError::ArithmeticOverflow("zero denominator"));
        }
        self.0
            .checked_mul(numerator)
            .map(|p| Amount(p / denominator))
            .ok_or(CustodyError::ArithmeticOverflow("ratio multiplication"))
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BasisPoints
// ---------------------------------------------------------------------------

/// Denominator for basis-point math: 10_000 bps == 100%.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// A proportional rate in basis points, validated to `[0, 10000]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BasisPoints(u16);

impl<'de> Deserialize<'de> for BasisPoints {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = u16::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

impl BasisPoints {
    /// Create a rate, validating the range.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::InvalidAmount`] if `bps > 10000`.
    pub fn new(bps: u16) -> Result<Self, CustodyError> {
        if u128::from(bps) > BPS_DENOMINATOR {
            return Err(CustodyError::InvalidAmount(format!(
                "basis points must be within [0, {BPS_DENOMINATOR}], got {bps}"
            )));
        }
        Ok(Self(bps))
    }

    /// The raw basis-point value.
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Compute `amount * bps / 10_000`, truncating toward zero.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::ArithmeticOverflow`] if the intermediate
    /// product overflows `u128`.
    pub fn apply_to(&self, amount: Amount) -> Result<Amount, CustodyError> {
        amount.mul_ratio(u128::from(self.0), BPS_DENOMINATOR)
    }
}

impl std::fmt::Display for BasisPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

// ---------------------------------------------------------------------------
// FeeTerms
// ---------------------------------------------------------------------------

/// A proportional fee and the party that collects it.
///
/// Attached to an agreement at creation (platform fee) or configured on the
/// arbitration authority (resolution fee). The fee is always computed from
/// the agreement's original amount and rounds down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTerms {
    /// The fee rate.
    pub basis_points: BasisPoints,
    /// The party credited with the fee.
    pub collector: PartyId,
}

impl FeeTerms {
    /// Split `amount` into `(fee, remainder)`.
    ///
    /// The fee truncates toward zero, so `fee + remainder == amount` always
    /// holds and the remainder absorbs the truncation dust.
    pub fn split(&self, amount: Amount) -> Result<(Amount, Amount), CustodyError> {
        let fee = self.basis_points.apply_to(amount)?;
        let remainder = amount.checked_sub(fee)?;
        Ok((fee, remainder))
    }
}
