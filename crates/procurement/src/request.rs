//! Purchase requests: creation, editing and workflow transitions.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use epro_core::{
    AuditStamp, CurrencyId, DomainError, DomainResult, Entity, OfficeId, RequestId, UserId,
};

use crate::reference::Office;
use crate::status::RequestStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrType {
    #[default]
    Goods,
    Services,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseType {
    Program,
    Operational,
}

impl PrType {
    pub fn as_str(self) -> &'static str {
        match self {
            PrType::Goods => "goods",
            PrType::Services => "services",
        }
    }
}

impl core::str::FromStr for PrType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "goods" => Ok(PrType::Goods),
            "services" => Ok(PrType::Services),
            _ => Err(DomainError::validation(format!("unknown PR type '{s}'"))),
        }
    }
}

impl ExpenseType {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpenseType::Program => "program",
            ExpenseType::Operational => "operational",
        }
    }
}

impl core::str::FromStr for ExpenseType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "program" => Ok(ExpenseType::Program),
            "operational" => Ok(ExpenseType::Operational),
            _ => Err(DomainError::validation(format!("unknown expense type '{s}'"))),
        }
    }
}

/// Root workflow entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub id: RequestId,
    /// Per-office serial number, assigned once at creation.
    pub sno: u32,
    pub office_id: OfficeId,
    pub country_code: String,
    pub currency_id: CurrencyId,
    /// Local currency units per USD.
    pub exchange_rate: Decimal,
    pub delivery_address: String,
    pub project_reference: String,
    pub required_date: NaiveDate,
    pub originator: UserId,
    pub origination_date: NaiveDate,
    pub procurement_review_by: Option<UserId>,
    pub procurement_review_date: Option<NaiveDate>,
    pub approver1: UserId,
    pub approval1_date: Option<NaiveDate>,
    pub approver2: Option<UserId>,
    pub approval2_date: Option<NaiveDate>,
    pub finance_reviewer: Option<UserId>,
    pub finance_review_date: Option<NaiveDate>,
    pub submission_date: Option<NaiveDate>,
    pub status: RequestStatus,
    pub status_notes: Option<String>,
    pub pr_type: PrType,
    pub expense_type: Option<ExpenseType>,
    pub processing_office_id: Option<OfficeId>,
    pub assigned_by: Option<UserId>,
    pub assigned_to: Option<UserId>,
    pub assigned_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub preferred_supplier: bool,
    pub cancellation_requested_date: Option<NaiveDate>,
    pub cancellation_requested_by: Option<UserId>,
    pub cancelled_by: Option<UserId>,
    pub cancellation_date: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

/// Input for creating a purchase request.
///
/// Required references are optional here so that their absence is reported
/// as a validation failure with a readable reason.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPurchaseRequest {
    pub office_id: Option<OfficeId>,
    pub currency_id: Option<CurrencyId>,
    pub exchange_rate: Decimal,
    pub delivery_address: String,
    pub project_reference: String,
    pub required_date: NaiveDate,
    pub originator: Option<UserId>,
    pub approver1: Option<UserId>,
    pub approver2: Option<UserId>,
    #[serde(default)]
    pub pr_type: PrType,
    pub expense_type: Option<ExpenseType>,
    pub notes: Option<String>,
    #[serde(default)]
    pub preferred_supplier: bool,
}

/// Required references extracted by [`NewPurchaseRequest::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestRefs {
    pub office_id: OfficeId,
    pub currency_id: CurrencyId,
    pub originator: UserId,
    pub approver1: UserId,
}

fn check_text(field: &str, value: &str, max_len: usize) -> DomainResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    if value.chars().count() > max_len {
        return Err(DomainError::validation(format!(
            "{field} cannot be longer than {max_len} characters"
        )));
    }
    Ok(value.to_string())
}

fn check_exchange_rate(rate: Decimal) -> DomainResult<()> {
    if rate <= Decimal::ZERO {
        return Err(DomainError::validation("exchange rate must be greater than zero"));
    }
    if rate.normalize().scale() > 2 {
        return Err(DomainError::validation(
            "exchange rate cannot have more than two decimal places",
        ));
    }
    Ok(())
}

impl NewPurchaseRequest {
    pub fn validate(&self) -> DomainResult<RequestRefs> {
        let office_id = self
            .office_id
            .ok_or_else(|| DomainError::validation("originating office is required"))?;
        let currency_id = self
            .currency_id
            .ok_or_else(|| DomainError::validation("PR currency is required"))?;
        let originator = self
            .originator
            .ok_or_else(|| DomainError::validation("originator is required"))?;
        let approver1 = self
            .approver1
            .ok_or_else(|| DomainError::validation("approver1 is required"))?;
        check_exchange_rate(self.exchange_rate)?;
        check_text("delivery address", &self.delivery_address, 100)?;
        check_text("project reference", &self.project_reference, 140)?;
        Ok(RequestRefs {
            office_id,
            currency_id,
            originator,
            approver1,
        })
    }
}

/// Editable fields of a purchase request. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestPatch {
    pub currency_id: Option<CurrencyId>,
    pub exchange_rate: Option<Decimal>,
    pub delivery_address: Option<String>,
    pub project_reference: Option<String>,
    pub required_date: Option<NaiveDate>,
    pub approver1: Option<UserId>,
    pub approver2: Option<UserId>,
    #[serde(default)]
    pub clear_approver2: bool,
    pub pr_type: Option<PrType>,
    pub expense_type: Option<ExpenseType>,
    pub notes: Option<String>,
    pub preferred_supplier: Option<bool>,
}

/// Requested status change.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusTransition {
    pub to: RequestStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Assignment {
    pub assigned_to: UserId,
    pub processing_office_id: Option<OfficeId>,
}

impl PurchaseRequest {
    /// Build a new request in the `Drafted` state.
    ///
    /// `sno` must come from the office's sequence, computed under the same
    /// lock the insert runs in.
    pub fn draft(
        new: NewPurchaseRequest,
        office: &Office,
        sno: u32,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let refs = new.validate()?;
        if refs.office_id != office.id {
            return Err(DomainError::invariant("office does not match request"));
        }
        if sno == 0 {
            return Err(DomainError::invariant("sequence numbers start at 1"));
        }

        Ok(Self {
            id: RequestId::new(),
            sno,
            office_id: office.id,
            country_code: office.country_code.clone(),
            currency_id: refs.currency_id,
            exchange_rate: new.exchange_rate,
            delivery_address: check_text("delivery address", &new.delivery_address, 100)?,
            project_reference: check_text("project reference", &new.project_reference, 140)?,
            required_date: new.required_date,
            originator: refs.originator,
            origination_date: now.date_naive(),
            procurement_review_by: None,
            procurement_review_date: None,
            approver1: refs.approver1,
            approval1_date: None,
            approver2: new.approver2,
            approval2_date: None,
            finance_reviewer: None,
            finance_review_date: None,
            submission_date: None,
            status: RequestStatus::Drafted,
            status_notes: None,
            pr_type: new.pr_type,
            expense_type: new.expense_type,
            processing_office_id: None,
            assigned_by: None,
            assigned_to: None,
            assigned_date: None,
            notes: new.notes,
            preferred_supplier: new.preferred_supplier,
            cancellation_requested_date: None,
            cancellation_requested_by: None,
            cancelled_by: None,
            cancellation_date: None,
            audit: AuditStamp::created(actor, now),
        })
    }

    /// Reject edits to requests in a terminal state.
    pub fn ensure_editable(&self) -> DomainResult<()> {
        if self.status.is_closed() {
            return Err(DomainError::invariant(format!(
                "purchase request is {} and can no longer be changed",
                self.status
            )));
        }
        Ok(())
    }

    /// Apply an edit. Returns `true` when the exchange rate changed, in which
    /// case every item of the request must be repriced.
    pub fn apply_patch(
        &mut self,
        patch: RequestPatch,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        self.ensure_editable()?;

        let old_rate = self.exchange_rate;
        if let Some(rate) = patch.exchange_rate {
            check_exchange_rate(rate)?;
            self.exchange_rate = rate;
        }
        if let Some(currency_id) = patch.currency_id {
            self.currency_id = currency_id;
        }
        if let Some(address) = patch.delivery_address {
            self.delivery_address = check_text("delivery address", &address, 100)?;
        }
        if let Some(reference) = patch.project_reference {
            self.project_reference = check_text("project reference", &reference, 140)?;
        }
        if let Some(date) = patch.required_date {
            self.required_date = date;
        }
        if let Some(approver1) = patch.approver1 {
            self.approver1 = approver1;
        }
        if patch.clear_approver2 {
            self.approver2 = None;
        } else if let Some(approver2) = patch.approver2 {
            self.approver2 = Some(approver2);
        }
        if let Some(pr_type) = patch.pr_type {
            self.pr_type = pr_type;
        }
        if let Some(expense_type) = patch.expense_type {
            self.expense_type = Some(expense_type);
        }
        if let Some(notes) = patch.notes {
            self.notes = Some(notes);
        }
        if let Some(preferred) = patch.preferred_supplier {
            self.preferred_supplier = preferred;
        }

        self.audit.touch(actor, now);
        Ok(self.exchange_rate != old_rate)
    }

    /// Move the request to another status, enforcing the transition table and
    /// the approval chain. Returns the previous status.
    pub fn transition(
        &mut self,
        transition: StatusTransition,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<RequestStatus> {
        let from = self.status;
        let to = transition.to;
        if !from.can_transition_to(to) {
            return Err(DomainError::invariant(format!(
                "cannot move purchase request from {from} to {to}"
            )));
        }

        let today = now.date_naive();
        match to {
            RequestStatus::ProcurementVerified => {
                self.procurement_review_by = Some(actor);
                self.procurement_review_date = Some(today);
            }
            RequestStatus::Approved => {
                if actor != self.approver1 {
                    return Err(DomainError::invariant(
                        "only approver1 can give the first approval",
                    ));
                }
                self.approval1_date = Some(today);
            }
            RequestStatus::ApprovedII => {
                match self.approver2 {
                    None => {
                        return Err(DomainError::invariant(
                            "no second approver is set on this purchase request",
                        ));
                    }
                    Some(approver2) if approver2 != actor => {
                        return Err(DomainError::invariant(
                            "only approver2 can give the second approval",
                        ));
                    }
                    Some(_) => {}
                }
                self.approval2_date = Some(today);
            }
            RequestStatus::FinanceReviewed => {
                if from == RequestStatus::Approved && self.approver2.is_some() {
                    return Err(DomainError::invariant(
                        "second approval is required before finance review",
                    ));
                }
                self.finance_reviewer = Some(actor);
                self.finance_review_date = Some(today);
            }
            RequestStatus::Canceled => {
                self.cancelled_by = Some(actor);
                self.cancellation_date = Some(now);
            }
            _ => {}
        }

        if from == RequestStatus::Drafted && self.submission_date.is_none() {
            self.submission_date = Some(today);
        }
        if transition.notes.is_some() {
            self.status_notes = transition.notes;
        }
        self.status = to;
        self.audit.touch(Some(actor), now);
        Ok(from)
    }

    pub fn assign(
        &mut self,
        assignment: Assignment,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_editable()?;
        self.assigned_by = actor;
        self.assigned_to = Some(assignment.assigned_to);
        self.assigned_date = Some(now.date_naive());
        if assignment.processing_office_id.is_some() {
            self.processing_office_id = assignment.processing_office_id;
        }
        self.audit.touch(actor, now);
        Ok(())
    }

    pub fn request_cancellation(&mut self, actor: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_editable()?;
        if self.cancellation_requested_date.is_some() {
            return Err(DomainError::conflict("cancellation was already requested"));
        }
        self.cancellation_requested_by = Some(actor);
        self.cancellation_requested_date = Some(now.date_naive());
        self.audit.touch(Some(actor), now);
        Ok(())
    }

    /// Draft requests never carry a submission date.
    pub fn check_invariants(&self) -> DomainResult<()> {
        if self.status == RequestStatus::Drafted && self.submission_date.is_some() {
            return Err(DomainError::invariant(
                "draft purchase requests may not have a submission date",
            ));
        }
        Ok(())
    }
}

impl Entity for PurchaseRequest {
    type Id = RequestId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::NewOffice;
    use rust_decimal_macros::dec;

    fn office() -> Office {
        Office::create(
            NewOffice {
                name: "Kabul".to_string(),
                country_code: "AF".to_string(),
            },
            None,
            Utc::now(),
        )
        .unwrap()
    }

    fn new_request(office: &Office, approver1: UserId, approver2: Option<UserId>) -> NewPurchaseRequest {
        NewPurchaseRequest {
            office_id: Some(office.id),
            currency_id: Some(CurrencyId::new()),
            exchange_rate: dec!(70.00),
            delivery_address: "Main warehouse".to_string(),
            project_reference: "Winterization".to_string(),
            required_date: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
            originator: Some(UserId::new()),
            approver1: Some(approver1),
            approver2,
            pr_type: PrType::Goods,
            expense_type: None,
            notes: None,
            preferred_supplier: false,
        }
    }

    fn drafted(approver1: UserId, approver2: Option<UserId>) -> PurchaseRequest {
        let office = office();
        PurchaseRequest::draft(new_request(&office, approver1, approver2), &office, 1, None, Utc::now())
            .unwrap()
    }

    fn go(pr: &mut PurchaseRequest, to: RequestStatus, actor: UserId) -> DomainResult<RequestStatus> {
        pr.transition(StatusTransition { to, notes: None }, actor, Utc::now())
    }

    #[test]
    fn draft_starts_in_drafted_without_submission_date() {
        let pr = drafted(UserId::new(), None);
        assert_eq!(pr.status, RequestStatus::Drafted);
        assert_eq!(pr.sno, 1);
        assert_eq!(pr.country_code, "AF");
        assert!(pr.submission_date.is_none());
        assert!(pr.check_invariants().is_ok());
    }

    #[test]
    fn missing_approver_is_a_validation_failure() {
        let office = office();
        let mut new = new_request(&office, UserId::new(), None);
        new.approver1 = None;
        let err = new.validate().unwrap_err();
        assert_eq!(err, DomainError::validation("approver1 is required"));
    }

    #[test]
    fn missing_currency_is_a_validation_failure() {
        let office = office();
        let mut new = new_request(&office, UserId::new(), None);
        new.currency_id = None;
        let err = new.validate().unwrap_err();
        assert_eq!(err, DomainError::validation("PR currency is required"));
    }

    #[test]
    fn non_positive_exchange_rate_is_rejected() {
        let office = office();
        let mut new = new_request(&office, UserId::new(), None);
        new.exchange_rate = Decimal::ZERO;
        assert!(matches!(new.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn single_approval_path_reaches_open() {
        let approver = UserId::new();
        let clerk = UserId::new();
        let mut pr = drafted(approver, None);

        assert_eq!(go(&mut pr, RequestStatus::ProcurementVerified, clerk).unwrap(), RequestStatus::Drafted);
        assert!(pr.submission_date.is_some());
        assert_eq!(pr.procurement_review_by, Some(clerk));

        go(&mut pr, RequestStatus::Approved, approver).unwrap();
        assert!(pr.approval1_date.is_some());

        go(&mut pr, RequestStatus::FinanceReviewed, clerk).unwrap();
        go(&mut pr, RequestStatus::Open, clerk).unwrap();
        assert_eq!(pr.status, RequestStatus::Open);
        assert!(pr.check_invariants().is_ok());
    }

    #[test]
    fn unapproved_request_cannot_be_held_and_resumed_as_open() {
        let approver = UserId::new();
        let clerk = UserId::new();
        let mut pr = drafted(approver, None);
        go(&mut pr, RequestStatus::ProcurementVerified, clerk).unwrap();

        let err = go(&mut pr, RequestStatus::OnHold, clerk).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert!(go(&mut pr, RequestStatus::Open, clerk).is_err());

        go(&mut pr, RequestStatus::Approved, approver).unwrap();
        assert!(go(&mut pr, RequestStatus::OnHold, clerk).is_err());
        go(&mut pr, RequestStatus::FinanceReviewed, clerk).unwrap();
        go(&mut pr, RequestStatus::OnHold, clerk).unwrap();
        go(&mut pr, RequestStatus::Open, clerk).unwrap();
        assert!(pr.approval1_date.is_some());
        assert!(pr.finance_review_date.is_some());
    }

    #[test]
    fn exchange_rate_scale_ignores_trailing_zeros() {
        let office = office();
        let mut new = new_request(&office, UserId::new(), None);
        new.exchange_rate = dec!(2.000);
        assert!(new.validate().is_ok());

        new.exchange_rate = dec!(2.005);
        let err = new.validate().unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("exchange rate cannot have more than two decimal places")
        );
    }

    #[test]
    fn only_approver1_can_approve() {
        let mut pr = drafted(UserId::new(), None);
        go(&mut pr, RequestStatus::ProcurementVerified, UserId::new()).unwrap();
        let err = go(&mut pr, RequestStatus::Approved, UserId::new()).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(pr.status, RequestStatus::ProcurementVerified);
    }

    #[test]
    fn second_approver_must_sign_before_finance_review() {
        let a1 = UserId::new();
        let a2 = UserId::new();
        let mut pr = drafted(a1, Some(a2));
        go(&mut pr, RequestStatus::ProcurementVerified, UserId::new()).unwrap();
        go(&mut pr, RequestStatus::Approved, a1).unwrap();

        assert!(go(&mut pr, RequestStatus::FinanceReviewed, UserId::new()).is_err());
        assert!(go(&mut pr, RequestStatus::ApprovedII, a1).is_err());
        go(&mut pr, RequestStatus::ApprovedII, a2).unwrap();
        go(&mut pr, RequestStatus::FinanceReviewed, UserId::new()).unwrap();
    }

    #[test]
    fn second_approval_requires_a_second_approver() {
        let a1 = UserId::new();
        let mut pr = drafted(a1, None);
        go(&mut pr, RequestStatus::ProcurementVerified, UserId::new()).unwrap();
        go(&mut pr, RequestStatus::Approved, a1).unwrap();
        let err = go(&mut pr, RequestStatus::ApprovedII, a1).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(msg) if msg.contains("second approver")));
    }

    #[test]
    fn illegal_transition_names_both_states() {
        let mut pr = drafted(UserId::new(), None);
        let err = go(&mut pr, RequestStatus::Completed, UserId::new()).unwrap_err();
        assert_eq!(
            err,
            DomainError::invariant("cannot move purchase request from drafted to completed")
        );
    }

    #[test]
    fn canceled_request_is_frozen() {
        let actor = UserId::new();
        let mut pr = drafted(UserId::new(), None);
        go(&mut pr, RequestStatus::Canceled, actor).unwrap();
        assert_eq!(pr.cancelled_by, Some(actor));
        assert!(pr.cancellation_date.is_some());

        let err = pr
            .apply_patch(RequestPatch::default(), Some(actor), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn patch_reports_exchange_rate_changes() {
        let mut pr = drafted(UserId::new(), None);
        let changed = pr
            .apply_patch(
                RequestPatch {
                    notes: Some("urgent".to_string()),
                    ..RequestPatch::default()
                },
                None,
                Utc::now(),
            )
            .unwrap();
        assert!(!changed);

        let changed = pr
            .apply_patch(
                RequestPatch {
                    exchange_rate: Some(dec!(71.50)),
                    ..RequestPatch::default()
                },
                None,
                Utc::now(),
            )
            .unwrap();
        assert!(changed);
        assert_eq!(pr.exchange_rate, dec!(71.50));
    }

    #[test]
    fn cancellation_can_only_be_requested_once() {
        let actor = UserId::new();
        let mut pr = drafted(UserId::new(), None);
        pr.request_cancellation(actor, Utc::now()).unwrap();
        assert_eq!(pr.cancellation_requested_by, Some(actor));
        assert!(matches!(
            pr.request_cancellation(actor, Utc::now()),
            Err(DomainError::Conflict(_))
        ));
    }
}
