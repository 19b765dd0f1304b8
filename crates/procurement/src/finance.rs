//! Finance code splits of an item and the allocation rule across them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use epro_core::{
    AuditStamp, CodeId, DomainError, DomainResult, Entity, FinanceCodesId, ItemId, OfficeId,
    UserId,
};

/// Four-digit general ledger account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "GlAccountInput", into = "u16")]
pub struct GlAccount(u16);

/// Accepted wire forms: `4100` or `"4100"`.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum GlAccountInput {
    Number(i64),
    Text(String),
}

impl GlAccount {
    pub fn new(value: i64) -> DomainResult<Self> {
        if !(1000..=9999).contains(&value) {
            return Err(DomainError::validation("GL account must be a four digits number"));
        }
        Ok(Self(value as u16))
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

impl TryFrom<GlAccountInput> for GlAccount {
    type Error = DomainError;

    fn try_from(input: GlAccountInput) -> Result<Self, Self::Error> {
        match input {
            GlAccountInput::Number(n) => GlAccount::new(n),
            GlAccountInput::Text(s) => s.parse(),
        }
    }
}

impl From<GlAccount> for u16 {
    fn from(value: GlAccount) -> Self {
        value.0
    }
}

impl core::str::FromStr for GlAccount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 4 || !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::validation("GL account must be a four digits number"));
        }
        s.parse::<i64>()
            .map_err(|_| DomainError::validation("GL account must be a four digits number"))
            .and_then(GlAccount::new)
    }
}

impl core::fmt::Display for GlAccount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Share of an item's cost charged to one split, in percent (1 to 100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct AllocationPercent(Decimal);

impl AllocationPercent {
    pub const FULL: AllocationPercent = AllocationPercent(Decimal::ONE_HUNDRED);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value < Decimal::ONE || value > Decimal::ONE_HUNDRED {
            return Err(DomainError::validation(
                "allocation percent must be between 1 and 100",
            ));
        }
        if value.normalize().scale() > 2 {
            return Err(DomainError::validation(
                "allocation percent cannot have more than two decimal places",
            ));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> Decimal {
        self.0
    }
}

impl Default for AllocationPercent {
    fn default() -> Self {
        Self::FULL
    }
}

impl TryFrom<Decimal> for AllocationPercent {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        AllocationPercent::new(value)
    }
}

impl From<AllocationPercent> for Decimal {
    fn from(value: AllocationPercent) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinanceCodes {
    pub id: FinanceCodesId,
    pub item_id: ItemId,
    pub gl_account: GlAccount,
    pub fund_code_id: CodeId,
    pub dept_code_id: CodeId,
    pub office_code_id: OfficeId,
    pub lin_code_id: Option<CodeId>,
    pub activity_code_id: Option<CodeId>,
    pub employee_id: Option<u32>,
    pub allocation_percent: AllocationPercent,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

/// Input for adding or replacing a split.
#[derive(Debug, Clone, Deserialize)]
pub struct NewFinanceCodes {
    pub gl_account: GlAccount,
    pub fund_code_id: CodeId,
    pub dept_code_id: CodeId,
    pub office_code_id: OfficeId,
    pub lin_code_id: Option<CodeId>,
    pub activity_code_id: Option<CodeId>,
    pub employee_id: Option<u32>,
    #[serde(default)]
    pub allocation_percent: AllocationPercent,
}

impl FinanceCodes {
    /// Build a split. Callers must run [`check_allocation`] against the
    /// item's other splits first.
    pub fn create(
        item_id: ItemId,
        new: NewFinanceCodes,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if new.employee_id == Some(0) {
            return Err(DomainError::validation("employee id must be a positive number"));
        }
        Ok(Self {
            id: FinanceCodesId::new(),
            item_id,
            gl_account: new.gl_account,
            fund_code_id: new.fund_code_id,
            dept_code_id: new.dept_code_id,
            office_code_id: new.office_code_id,
            lin_code_id: new.lin_code_id,
            activity_code_id: new.activity_code_id,
            employee_id: new.employee_id,
            allocation_percent: new.allocation_percent,
            audit: AuditStamp::created(actor, now),
        })
    }

    pub fn replace(
        &mut self,
        new: NewFinanceCodes,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let rebuilt = Self::create(self.item_id, new, actor, now)?;
        self.gl_account = rebuilt.gl_account;
        self.fund_code_id = rebuilt.fund_code_id;
        self.dept_code_id = rebuilt.dept_code_id;
        self.office_code_id = rebuilt.office_code_id;
        self.lin_code_id = rebuilt.lin_code_id;
        self.activity_code_id = rebuilt.activity_code_id;
        self.employee_id = rebuilt.employee_id;
        self.allocation_percent = rebuilt.allocation_percent;
        self.audit.touch(actor, now);
        Ok(())
    }

    /// Copy this split onto another item (default finance codes).
    pub fn copy_to(&self, item_id: ItemId, actor: Option<UserId>, now: DateTime<Utc>) -> Self {
        Self {
            id: FinanceCodesId::new(),
            item_id,
            audit: AuditStamp::created(actor, now),
            ..self.clone()
        }
    }
}

/// Sum of allocation percentages of the given splits.
pub fn allocation_total(splits: &[FinanceCodes]) -> Decimal {
    splits.iter().map(|s| s.allocation_percent.value()).sum()
}

/// Check that adding `proposed` to an item keeps its allocation at or below
/// 100%. When editing, `replacing` names the split being rewritten so its old
/// value is not counted twice.
pub fn check_allocation(
    existing: &[FinanceCodes],
    replacing: Option<FinanceCodesId>,
    proposed: AllocationPercent,
) -> DomainResult<()> {
    let others: Decimal = existing
        .iter()
        .filter(|s| Some(s.id) != replacing)
        .map(|s| s.allocation_percent.value())
        .sum();
    if others + proposed.value() > Decimal::ONE_HUNDRED {
        return Err(DomainError::validation(format!(
            "allocations cannot be more than 100% ({others}% already allocated)"
        )));
    }
    Ok(())
}

impl Entity for FinanceCodes {
    type Id = FinanceCodesId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn split(item_id: ItemId, percent: Decimal) -> FinanceCodes {
        FinanceCodes::create(
            item_id,
            NewFinanceCodes {
                gl_account: GlAccount::new(4100).unwrap(),
                fund_code_id: CodeId::new(),
                dept_code_id: CodeId::new(),
                office_code_id: OfficeId::new(),
                lin_code_id: None,
                activity_code_id: None,
                employee_id: None,
                allocation_percent: AllocationPercent::new(percent).unwrap(),
            },
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn gl_account_must_have_four_digits() {
        assert!(GlAccount::new(4100).is_ok());
        assert!(GlAccount::new(999).is_err());
        assert!(GlAccount::new(10000).is_err());
        assert!("0100".parse::<GlAccount>().is_err());
        assert!("41a0".parse::<GlAccount>().is_err());
        assert_eq!("4100".parse::<GlAccount>().unwrap().value(), 4100);
    }

    #[test]
    fn gl_account_deserializes_from_number_or_string() {
        let a: GlAccount = serde_json::from_str("4100").unwrap();
        let b: GlAccount = serde_json::from_str("\"4100\"").unwrap();
        assert_eq!(a, b);
        assert!(serde_json::from_str::<GlAccount>("\"12345\"").is_err());
        assert_eq!(serde_json::to_string(&a).unwrap(), "4100");
    }

    #[test]
    fn allocation_percent_bounds() {
        assert!(AllocationPercent::new(dec!(0.99)).is_err());
        assert!(AllocationPercent::new(dec!(100.01)).is_err());
        assert!(AllocationPercent::new(dec!(33.333)).is_err());
        assert!(AllocationPercent::new(dec!(33.33)).is_ok());
        assert_eq!(AllocationPercent::default().value(), dec!(100));
    }

    #[test]
    fn sixty_plus_forty_five_is_rejected_sixty_plus_forty_accepted() {
        let item = ItemId::new();
        let existing = vec![split(item, dec!(60))];
        let err = check_allocation(&existing, None, AllocationPercent::new(dec!(45)).unwrap())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("100%")));
        assert!(check_allocation(&existing, None, AllocationPercent::new(dec!(40)).unwrap()).is_ok());
    }

    #[test]
    fn editing_a_split_does_not_count_its_old_value() {
        let item = ItemId::new();
        let existing = vec![split(item, dec!(60)), split(item, dec!(40))];
        let editing = existing[1].id;
        assert!(
            check_allocation(&existing, Some(editing), AllocationPercent::new(dec!(40)).unwrap())
                .is_ok()
        );
        assert!(
            check_allocation(&existing, Some(editing), AllocationPercent::new(dec!(41)).unwrap())
                .is_err()
        );
    }

    #[test]
    fn copy_to_keeps_codes_with_a_new_identity() {
        let source = split(ItemId::new(), dec!(25));
        let target = ItemId::new();
        let copy = source.copy_to(target, None, Utc::now());
        assert_ne!(copy.id, source.id);
        assert_eq!(copy.item_id, target);
        assert_eq!(copy.gl_account, source.gl_account);
        assert_eq!(copy.allocation_percent, source.allocation_percent);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        #[test]
        fn accepted_splits_never_exceed_one_hundred(
            proposals in proptest::collection::vec(100i64..=10_000i64, 1..12),
        ) {
            let item = ItemId::new();
            let mut accepted: Vec<FinanceCodes> = Vec::new();
            for cents in proposals {
                let percent = AllocationPercent::new(Decimal::new(cents, 2)).unwrap();
                if check_allocation(&accepted, None, percent).is_ok() {
                    accepted.push(split(item, percent.value()));
                }
            }
            prop_assert!(allocation_total(&accepted) <= Decimal::ONE_HUNDRED);
        }
    }
}
