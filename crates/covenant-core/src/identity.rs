//! # Identity Newtypes
//!
//! Domain-primitive newtypes for the two identifiers the engine handles.
//! Each is a distinct type — you cannot pass an [`AgreementId`] where a
//! [`PartyId`] is expected.
//!
//! ## Validation
//!
//! [`PartyId`] validates at construction time (and at deserialization, via
//! the validating `Deserialize` impl): the engine receives caller
//! identifiers that are already authenticated upstream, but it still
//! refuses empty or control-character identifiers so that role comparisons
//! and log lines are always well-formed.
//!
//! [`AgreementId`] values are assigned by the ledger from a monotonic
//! counter and are never reused.

use serde::{Deserialize, Serialize};

use crate::error::CustodyError;

/// Helper macro to implement `Deserialize` for string newtypes that must
/// validate their contents. Deserializes as a plain `String`, then routes
/// through the type's `new()` constructor so that invalid values are
/// rejected at deserialization time — not silently accepted.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// PartyId
// ---------------------------------------------------------------------------

/// An authenticated participant identifier.
///
/// The engine never authenticates callers; the hosting environment hands it
/// a `PartyId` that has already passed authentication, and the engine only
/// authorizes it against the roles stored on an agreement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PartyId(String);

impl_validating_deserialize!(PartyId);

impl PartyId {
    /// Maximum accepted identifier length, in bytes.
    pub const MAX_LEN: usize = 128;

    /// Create a party identifier, validating its shape.
    ///
    /// # Errors
    ///
    /// Returns [`CustodyError::InvalidParty`] if the identifier is empty,
    /// longer than [`MAX_LEN`](Self::MAX_LEN) bytes, or contains
    /// whitespace or control characters.
    pub fn new(value: impl Into<String>) -> Result<Self, CustodyError> {
        let s = value.into();
        if s.is_empty() {
            return Err(CustodyError::InvalidParty(
                "party identifier must be non-empty".to_string(),
            ));
        }
        if s.len() > Self::MAX_LEN {
            return Err(CustodyError::InvalidParty(format!(
                "party identifier exceeds {} bytes",
                Self::MAX_LEN
            )));
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(CustodyError::InvalidParty(format!(
                "party identifier {s:?} contains whitespace or control characters"
            )));
        }
        Ok(Self(s))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// AgreementId
// ---------------------------------------------------------------------------

/// A unique identifier for a custody agreement.
///
/// Assigned monotonically by the ledger; identifiers are never reused, so a
/// historical agreement remains addressable after it reaches a terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgreementId(u64);

impl AgreementId {
    /// Wrap an existing sequence number.
    pub fn from_sequence(seq: u64) -> Self {
        Self(seq)
    }

    /// The underlying sequence number.
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for AgreementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "agreement:{}", self.0)
    }
}
