//! Deployment configuration for the custody ledger.
//!
//! All knobs are fixed at construction. Fees apply to agreements opened
//! (or disputes resolved) after the ledger starts; there is no runtime
//! reconfiguration.

use serde::{Deserialize, Serialize};

use covenant_core::FeeTerms;
use covenant_state::ApprovalPolicy;

/// Ledger-wide policy knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Proportional fee attached to every agreement at creation and taken
    /// on completion. `None` disables platform fees.
    #[serde(default)]
    pub platform_fee: Option<FeeTerms>,

    /// Fee taken by the arbitration authority when it rules on a dispute.
    /// `None` makes arbitration free.
    #[serde(default)]
    pub arbitration_fee: Option<FeeTerms>,

    /// Whether escrow completion needs one confirmation or both parties'.
    #[serde(default)]
    pub approval_policy: ApprovalPolicy,
}
