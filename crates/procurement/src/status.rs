//! Purchase request workflow states and the transition table between them.

use serde::{Deserialize, Serialize};

use epro_core::DomainError;

/// Purchase request status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Drafted,
    ProcurementVerified,
    Approved,
    #[serde(rename = "approved_ii")]
    ApprovedII,
    FinanceReviewed,
    Open,
    Completed,
    OnHold,
    Canceled,
    Rejected,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 10] = [
        RequestStatus::Drafted,
        RequestStatus::ProcurementVerified,
        RequestStatus::Approved,
        RequestStatus::ApprovedII,
        RequestStatus::FinanceReviewed,
        RequestStatus::Open,
        RequestStatus::Completed,
        RequestStatus::OnHold,
        RequestStatus::Canceled,
        RequestStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Drafted => "drafted",
            RequestStatus::ProcurementVerified => "procurement_verified",
            RequestStatus::Approved => "approved",
            RequestStatus::ApprovedII => "approved_ii",
            RequestStatus::FinanceReviewed => "finance_reviewed",
            RequestStatus::Open => "open",
            RequestStatus::Completed => "completed",
            RequestStatus::OnHold => "on_hold",
            RequestStatus::Canceled => "canceled",
            RequestStatus::Rejected => "rejected",
        }
    }

    /// Terminal states accept no further transitions or edits.
    pub fn is_closed(self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Canceled | RequestStatus::Rejected
        )
    }

    /// Targets reachable from `self`, before approval-chain guards.
    ///
    /// Only finance-reviewed or open requests can be put on hold, so resuming
    /// to `Open` never skips an approval.
    pub fn successors(self) -> &'static [RequestStatus] {
        use RequestStatus::*;
        match self {
            Drafted => &[ProcurementVerified, Canceled],
            ProcurementVerified => &[Approved, Rejected, Canceled],
            Approved => &[ApprovedII, FinanceReviewed, Rejected, Canceled],
            ApprovedII => &[FinanceReviewed, Rejected, Canceled],
            FinanceReviewed => &[Open, Rejected, OnHold, Canceled],
            Open => &[Completed, OnHold, Canceled],
            OnHold => &[Open, Canceled],
            Completed | Canceled | Rejected => &[],
        }
    }

    pub fn can_transition_to(self, to: RequestStatus) -> bool {
        self.successors().contains(&to)
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown request status '{s}'")))
    }
}
