//! Reference data: offices, currencies, units, vendors and finance code catalogs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use epro_core::{
    AuditStamp, CodeId, CurrencyId, DomainError, DomainResult, Entity, OfficeId, UnitId, UserId,
    VendorId,
};

fn required(field: &str, value: &str, max_len: usize) -> DomainResult<String> {
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

fn country_code(value: &str) -> DomainResult<String> {
    let code = value.trim().to_ascii_uppercase();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DomainError::validation(
            "country code must be a two-letter ISO code",
        ));
    }
    Ok(code)
}

/// An office purchase requests originate from (and are processed by).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Office {
    pub id: OfficeId,
    pub name: String,
    pub country_code: String,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOffice {
    pub name: String,
    pub country_code: String,
}

impl Office {
    pub fn create(new: NewOffice, actor: Option<UserId>, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: OfficeId::new(),
            name: required("office name", &new.name, 100)?,
            country_code: country_code(&new.country_code)?,
            audit: AuditStamp::created(actor, now),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub id: CurrencyId,
    pub country_code: String,
    pub code: String,
    pub name: Option<String>,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCurrency {
    pub country_code: String,
    pub code: String,
    pub name: Option<String>,
}

impl Currency {
    pub fn create(new: NewCurrency, actor: Option<UserId>, now: DateTime<Utc>) -> DomainResult<Self> {
        let code = new.code.trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation(
                "currency code must be a three-letter ISO code",
            ));
        }
        Ok(Self {
            id: CurrencyId::new(),
            country_code: country_code(&new.country_code)?,
            code,
            name: new.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            audit: AuditStamp::created(actor, now),
        })
    }
}

/// Unit of measure for requested items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub mnemonic: String,
    pub description: Option<String>,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUnit {
    pub mnemonic: String,
    pub description: Option<String>,
}

impl Unit {
    pub fn create(new: NewUnit, actor: Option<UserId>, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: UnitId::new(),
            mnemonic: required("unit mnemonic", &new.mnemonic, 4)?,
            description: new.description,
            audit: AuditStamp::created(actor, now),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: VendorId,
    pub country_code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub contact_person: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub black_listed: bool,
    pub reason_black_listed: Option<String>,
    pub black_listed_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVendor {
    pub country_code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub contact_person: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub black_listed: bool,
    pub reason_black_listed: Option<String>,
    pub black_listed_date: Option<NaiveDate>,
}

impl Vendor {
    pub fn create(new: NewVendor, actor: Option<UserId>, now: DateTime<Utc>) -> DomainResult<Self> {
        if let Some(email) = &new.email {
            if !email.contains('@') {
                return Err(DomainError::validation("vendor email is not a valid address"));
            }
        }
        if new.black_listed && new.reason_black_listed.as_deref().is_none_or(|r| r.trim().is_empty()) {
            return Err(DomainError::validation(
                "a reason is required to blacklist a vendor",
            ));
        }
        Ok(Self {
            id: VendorId::new(),
            country_code: new.country_code.as_deref().map(country_code).transpose()?,
            name: required("vendor name", &new.name, 100)?,
            description: new.description,
            contact_person: new.contact_person,
            address: new.address,
            phone: new.phone,
            email: new.email,
            black_listed: new.black_listed,
            reason_black_listed: new.reason_black_listed,
            black_listed_date: new.black_listed_date,
            audit: AuditStamp::created(actor, now),
        })
    }

    /// Blacklisted vendors cannot be quoted, selected or ordered from.
    pub fn ensure_selectable(&self) -> DomainResult<()> {
        if self.black_listed {
            return Err(DomainError::invariant(format!(
                "vendor '{}' is blacklisted",
                self.name
            )));
        }
        Ok(())
    }
}

/// Finance code catalogs referenced by finance code splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeKind {
    Fund,
    #[serde(rename = "dept")]
    Department,
    Lin,
    Activity,
}

impl CodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CodeKind::Fund => "fund",
            CodeKind::Department => "dept",
            CodeKind::Lin => "lin",
            CodeKind::Activity => "activity",
        }
    }

    pub fn max_len(self) -> usize {
        match self {
            CodeKind::Fund | CodeKind::Department => 5,
            CodeKind::Lin | CodeKind::Activity => 9,
        }
    }
}

impl core::fmt::Display for CodeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for CodeKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fund" => Ok(CodeKind::Fund),
            "dept" => Ok(CodeKind::Department),
            "lin" => Ok(CodeKind::Lin),
            "activity" => Ok(CodeKind::Activity),
            _ => Err(DomainError::validation(
                "code kind must be one of: fund, dept, lin, activity",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    pub id: CodeId,
    pub kind: CodeKind,
    pub country_code: String,
    pub code: String,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCode {
    pub country_code: String,
    pub code: String,
}

impl Code {
    pub fn create(
        kind: CodeKind,
        new: NewCode,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id: CodeId::new(),
            kind,
            country_code: country_code(&new.country_code)?,
            code: required(&format!("{kind} code"), &new.code, kind.max_len())?,
            audit: AuditStamp::created(actor, now),
        })
    }

    /// Check that a referenced code belongs to the expected catalog.
    pub fn ensure_kind(&self, expected: CodeKind) -> DomainResult<()> {
        if self.kind != expected {
            return Err(DomainError::validation(format!(
                "code '{}' is a {} code, expected a {} code",
                self.code, self.kind, expected
            )));
        }
        Ok(())
    }
}

macro_rules! entity {
    ($t:ty, $id:ty) => {
        impl Entity for $t {
            type Id = $id;

            fn id(&self) -> Self::Id {
                self.id
            }
        }
    };
}

entity!(Office, OfficeId);
entity!(Currency, CurrencyId);
entity!(Unit, UnitId);
entity!(Vendor, VendorId);
entity!(Code, CodeId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn office_country_code_is_normalized() {
        let office = Office::create(
            NewOffice {
                name: " Kabul ".to_string(),
                country_code: "af".to_string(),
            },
            None,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(office.name, "Kabul");
        assert_eq!(office.country_code, "AF");
    }

    #[test]
    fn currency_code_must_have_three_letters() {
        let err = Currency::create(
            NewCurrency {
                country_code: "AF".to_string(),
                code: "AFNX".to_string(),
                name: None,
            },
            None,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn code_length_depends_on_kind() {
        let new = || NewCode {
            country_code: "AF".to_string(),
            code: "1234567".to_string(),
        };
        assert!(Code::create(CodeKind::Fund, new(), None, Utc::now()).is_err());
        assert!(Code::create(CodeKind::Lin, new(), None, Utc::now()).is_ok());
    }

    #[test]
    fn code_kind_mismatch_is_reported() {
        let code = Code::create(
            CodeKind::Department,
            NewCode {
                country_code: "AF".to_string(),
                code: "D01".to_string(),
            },
            None,
            Utc::now(),
        )
        .unwrap();
        let err = code.ensure_kind(CodeKind::Fund).unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("code 'D01' is a dept code, expected a fund code")
        );
    }

    #[test]
    fn blacklisting_requires_reason_and_blocks_selection() {
        let mut new = NewVendor {
            country_code: None,
            name: "Acme".to_string(),
            description: None,
            contact_person: None,
            address: None,
            phone: None,
            email: None,
            black_listed: true,
            reason_black_listed: None,
            black_listed_date: None,
        };
        assert!(Vendor::create(new.clone(), None, Utc::now()).is_err());

        new.reason_black_listed = Some("fraud".to_string());
        let vendor = Vendor::create(new, None, Utc::now()).unwrap();
        assert!(matches!(
            vendor.ensure_selectable(),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn code_kind_parses_wire_names() {
        assert_eq!("dept".parse::<CodeKind>().unwrap(), CodeKind::Department);
        assert!("department".parse::<CodeKind>().is_err());
    }
}
