//! Offices, currencies, units, vendors and finance code catalogs.

use chrono::Utc;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use epro_core::{CodeId, CurrencyId, OfficeId, UnitId, UserId, VendorId};
use epro_procurement::{
    Code, CodeKind, Currency, NewCode, NewCurrency, NewOffice, NewUnit, NewVendor, Office, Unit,
    Vendor,
};

use super::{PostgresProcurementStore, fetch_one, fetch_optional, map_sqlx_error, opt_uuid, rows};
use crate::store::{StoreResult, ensure_code, unknown};

pub(super) async fn office_by_id(conn: &mut PgConnection, id: OfficeId) -> StoreResult<Option<Office>> {
    fetch_optional(conn, "SELECT * FROM offices WHERE id = $1", *id.as_uuid(), rows::office).await
}

pub(super) async fn vendor_by_id(conn: &mut PgConnection, id: VendorId) -> StoreResult<Option<Vendor>> {
    fetch_optional(conn, "SELECT * FROM vendors WHERE id = $1", *id.as_uuid(), rows::vendor).await
}

/// Resolve an optional vendor reference carried by an input.
pub(super) async fn vendor_ref(conn: &mut PgConnection, id: Option<VendorId>) -> StoreResult<Option<Vendor>> {
    match id {
        Some(id) => Ok(Some(vendor_by_id(conn, id).await?.ok_or_else(|| unknown("vendor"))?)),
        None => Ok(None),
    }
}

pub(super) async fn ensure_office(conn: &mut PgConnection, id: OfficeId, what: &str) -> StoreResult<()> {
    office_by_id(conn, id).await?.map(|_| ()).ok_or_else(|| unknown(what))
}

pub(super) async fn ensure_currency(conn: &mut PgConnection, id: CurrencyId) -> StoreResult<()> {
    fetch_optional(conn, "SELECT id FROM currencies WHERE id = $1", *id.as_uuid(), |row| {
        sqlx::Row::try_get::<Uuid, _>(row, "id")
    })
    .await?
    .map(|_| ())
    .ok_or_else(|| unknown("currency"))
}

pub(super) async fn ensure_unit(conn: &mut PgConnection, id: UnitId) -> StoreResult<()> {
    fetch_optional(conn, "SELECT id FROM units WHERE id = $1", *id.as_uuid(), |row| {
        sqlx::Row::try_get::<Uuid, _>(row, "id")
    })
    .await?
    .map(|_| ())
    .ok_or_else(|| unknown("unit"))
}

/// Check a code reference exists in the expected catalog.
pub(super) async fn check_code(conn: &mut PgConnection, id: CodeId, expected: CodeKind) -> StoreResult<()> {
    let code = fetch_optional(conn, "SELECT * FROM codes WHERE id = $1", *id.as_uuid(), rows::code).await?;
    ensure_code(code.as_ref(), expected)
}

impl PostgresProcurementStore {
    #[instrument(skip(self, new), err)]
    pub(super) async fn create_office(&self, new: NewOffice, actor: Option<UserId>) -> StoreResult<Office> {
        let office = Office::create(new, actor, Utc::now())?;
        sqlx::query(
            r#"
            INSERT INTO offices (id, name, country_code, created_at, created_by)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(office.id.as_uuid())
        .bind(&office.name)
        .bind(&office.country_code)
        .bind(office.audit.created_at)
        .bind(opt_uuid(office.audit.created_by))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_office", e))?;
        Ok(office)
    }

    #[instrument(skip(self), err)]
    pub(super) async fn list_offices(&self) -> StoreResult<Vec<Office>> {
        let records = sqlx::query("SELECT * FROM offices ORDER BY name, id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_offices", e))?;
        records.iter()
            .map(rows::office)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("decode_office", e))
    }

    #[instrument(skip(self), fields(office_id = %id), err)]
    pub(super) async fn get_office(&self, id: OfficeId) -> StoreResult<Office> {
        let mut conn = self.conn().await?;
        fetch_one(&mut conn, "SELECT * FROM offices WHERE id = $1", *id.as_uuid(), rows::office, "office").await
    }

    #[instrument(skip(self, new), err)]
    pub(super) async fn create_currency(&self, new: NewCurrency, actor: Option<UserId>) -> StoreResult<Currency> {
        let currency = Currency::create(new, actor, Utc::now())?;
        sqlx::query(
            r#"
            INSERT INTO currencies (id, country_code, code, name, created_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(currency.id.as_uuid())
        .bind(&currency.country_code)
        .bind(&currency.code)
        .bind(&currency.name)
        .bind(currency.audit.created_at)
        .bind(opt_uuid(currency.audit.created_by))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_currency", e))?;
        Ok(currency)
    }

    #[instrument(skip(self), err)]
    pub(super) async fn list_currencies(&self) -> StoreResult<Vec<Currency>> {
        let records = sqlx::query("SELECT * FROM currencies ORDER BY code")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_currencies", e))?;
        records.iter()
            .map(rows::currency)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("decode_currency", e))
    }

    #[instrument(skip(self, new), err)]
    pub(super) async fn create_unit(&self, new: NewUnit, actor: Option<UserId>) -> StoreResult<Unit> {
        let unit = Unit::create(new, actor, Utc::now())?;
        sqlx::query(
            r#"
            INSERT INTO units (id, mnemonic, description, created_at, created_by)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(unit.id.as_uuid())
        .bind(&unit.mnemonic)
        .bind(&unit.description)
        .bind(unit.audit.created_at)
        .bind(opt_uuid(unit.audit.created_by))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_unit", e))?;
        Ok(unit)
    }

    #[instrument(skip(self), err)]
    pub(super) async fn list_units(&self) -> StoreResult<Vec<Unit>> {
        let records = sqlx::query("SELECT * FROM units ORDER BY mnemonic")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_units", e))?;
        records.iter()
            .map(rows::unit)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("decode_unit", e))
    }

    #[instrument(skip(self, new), err)]
    pub(super) async fn create_vendor(&self, new: NewVendor, actor: Option<UserId>) -> StoreResult<Vendor> {
        let vendor = Vendor::create(new, actor, Utc::now())?;
        sqlx::query(
            r#"
            INSERT INTO vendors (
                id, country_code, name, description, contact_person, address, phone, email,
                black_listed, reason_black_listed, black_listed_date, created_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(vendor.id.as_uuid())
        .bind(&vendor.country_code)
        .bind(&vendor.name)
        .bind(&vendor.description)
        .bind(&vendor.contact_person)
        .bind(&vendor.address)
        .bind(&vendor.phone)
        .bind(&vendor.email)
        .bind(vendor.black_listed)
        .bind(&vendor.reason_black_listed)
        .bind(vendor.black_listed_date)
        .bind(vendor.audit.created_at)
        .bind(opt_uuid(vendor.audit.created_by))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_vendor", e))?;
        Ok(vendor)
    }

    #[instrument(skip(self), err)]
    pub(super) async fn list_vendors(&self) -> StoreResult<Vec<Vendor>> {
        let records = sqlx::query("SELECT * FROM vendors ORDER BY name, id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_vendors", e))?;
        records.iter()
            .map(rows::vendor)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("decode_vendor", e))
    }

    #[instrument(skip(self), fields(vendor_id = %id), err)]
    pub(super) async fn get_vendor(&self, id: VendorId) -> StoreResult<Vendor> {
        let mut conn = self.conn().await?;
        fetch_one(&mut conn, "SELECT * FROM vendors WHERE id = $1", *id.as_uuid(), rows::vendor, "vendor").await
    }

    #[instrument(skip(self, new), fields(kind = %kind), err)]
    pub(super) async fn create_code(&self, kind: CodeKind, new: NewCode, actor: Option<UserId>) -> StoreResult<Code> {
        let code = Code::create(kind, new, actor, Utc::now())?;
        sqlx::query(
            r#"
            INSERT INTO codes (id, kind, country_code, code, created_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(code.id.as_uuid())
        .bind(code.kind.as_str())
        .bind(&code.country_code)
        .bind(&code.code)
        .bind(code.audit.created_at)
        .bind(opt_uuid(code.audit.created_by))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_code", e))?;
        Ok(code)
    }

    #[instrument(skip(self), fields(kind = %kind), err)]
    pub(super) async fn list_codes(&self, kind: CodeKind) -> StoreResult<Vec<Code>> {
        let records = sqlx::query("SELECT * FROM codes WHERE kind = $1 ORDER BY code")
            .bind(kind.as_str())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_codes", e))?;
        records.iter()
            .map(rows::code)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("decode_code", e))
    }
}
