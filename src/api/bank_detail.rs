use crate::{
    error::{ApiError, require_fields},
    model::bank_detail::BankDetail,
    response,
    utils::db_utils::{Field, FieldKind, build_update_sql, execute_update, into_object},
};
use actix_web::HttpResponse;
use serde::Deserialize;
use serde_json::Value;
use sqlx::{MySqlConnection, MySqlPool};

/// Which table family a set of bank accounts hangs off.
pub struct BankOwner {
    pub table: &'static str,
    pub owner_column: &'static str,
    pub owner_table: &'static str,
    pub label: &'static str,
}

pub const EMPLOYEE_ACCOUNTS: BankOwner = BankOwner {
    table: "employee_bank_details",
    owner_column: "employee_id",
    owner_table: "employees",
    label: "Employee",
};

pub const TRAINER_ACCOUNTS: BankOwner = BankOwner {
    table: "trainer_bank_details",
    owner_column: "trainer_id",
    owner_table: "trainers",
    label: "Trainer",
};

#[derive(Debug, Deserialize)]
pub struct CreateBankDetail {
    pub account_holder: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub bank_name: String,
    pub branch: Option<String>,
    pub is_active: Option<bool>,
}

impl CreateBankDetail {
    pub fn validate(&self) -> Result<(), ApiError> {
        require_fields(&[
            ("account_holder", &self.account_holder),
            ("account_number", &self.account_number),
            ("ifsc_code", &self.ifsc_code),
            ("bank_name", &self.bank_name),
        ])
    }
}

const BANK_FIELDS: &[Field] = &[
    Field::required("account_holder", FieldKind::Text),
    Field::required("account_number", FieldKind::Text),
    Field::required("ifsc_code", FieldKind::Text),
    Field::required("bank_name", FieldKind::Text),
    Field::optional("branch", FieldKind::Text),
    Field::required("is_active", FieldKind::Bool),
];

fn select_sql(owner: &BankOwner) -> String {
    format!(
        "SELECT id, {} AS owner_id, account_holder, account_number, ifsc_code, bank_name, \
         branch, is_active FROM {}",
        owner.owner_column, owner.table
    )
}

/// Inserts one account; callers run it inside their own transaction when the
/// account is created together with its owner.
pub async fn insert(
    conn: &mut MySqlConnection,
    owner: &BankOwner,
    owner_id: u64,
    detail: &CreateBankDetail,
) -> Result<u64, sqlx::Error> {
    let sql = format!(
        "INSERT INTO {} ({}, account_holder, account_number, ifsc_code, bank_name, branch, is_active) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        owner.table, owner.owner_column
    );

    let result = sqlx::query(&sql)
        .bind(owner_id)
        .bind(detail.account_holder.trim())
        .bind(detail.account_number.trim())
        .bind(detail.ifsc_code.trim().to_uppercase())
        .bind(detail.bank_name.trim())
        .bind(&detail.branch)
        .bind(detail.is_active.unwrap_or(true))
        .execute(conn)
        .await?;

    Ok(result.last_insert_id())
}

async fn ensure_owner(pool: &MySqlPool, owner: &BankOwner, owner_id: u64) -> Result<(), ApiError> {
    let found = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM {} WHERE id = ?",
        owner.owner_table
    ))
    .bind(owner_id)
    .fetch_one(pool)
    .await?;

    if found == 0 {
        return Err(ApiError::not_found(format!("{} not found", owner.label)));
    }
    Ok(())
}

pub async fn fetch_for(
    pool: &MySqlPool,
    owner: &BankOwner,
    owner_id: u64,
) -> Result<Vec<BankDetail>, sqlx::Error> {
    sqlx::query_as::<_, BankDetail>(&format!(
        "{} WHERE {} = ? ORDER BY id",
        select_sql(owner),
        owner.owner_column
    ))
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

pub async fn add(
    pool: &MySqlPool,
    owner: &BankOwner,
    owner_id: u64,
    detail: &CreateBankDetail,
) -> Result<HttpResponse, ApiError> {
    detail.validate()?;
    ensure_owner(pool, owner, owner_id).await?;

    let mut conn = pool.acquire().await?;
    let id = insert(&mut conn, owner, owner_id, detail).await?;

    let row = sqlx::query_as::<_, BankDetail>(&format!("{} WHERE id = ?", select_sql(owner)))
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(response::created("Bank details added successfully", row))
}

pub async fn list(pool: &MySqlPool, owner: &BankOwner, owner_id: u64) -> Result<HttpResponse, ApiError> {
    ensure_owner(pool, owner, owner_id).await?;
    let rows = fetch_for(pool, owner, owner_id).await?;
    Ok(response::ok("Bank details fetched successfully", rows))
}

pub async fn update(
    pool: &MySqlPool,
    owner: &BankOwner,
    owner_id: u64,
    bank_id: u64,
    body: Value,
) -> Result<HttpResponse, ApiError> {
    let payload = into_object(body)?;
    let update = build_update_sql(owner.table, &payload, BANK_FIELDS, "id", bank_id)?;

    let owned = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM {} WHERE id = ? AND {} = ?",
        owner.table, owner.owner_column
    ))
    .bind(bank_id)
    .bind(owner_id)
    .fetch_one(pool)
    .await?;
    if owned == 0 {
        return Err(ApiError::not_found("Bank details not found"));
    }

    execute_update(pool, update).await?;

    let row = sqlx::query_as::<_, BankDetail>(&format!("{} WHERE id = ?", select_sql(owner)))
        .bind(bank_id)
        .fetch_one(pool)
        .await?;

    Ok(response::ok("Bank details updated successfully", row))
}

pub async fn delete(
    pool: &MySqlPool,
    owner: &BankOwner,
    owner_id: u64,
    bank_id: u64,
) -> Result<HttpResponse, ApiError> {
    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE id = ? AND {} = ?",
        owner.table, owner.owner_column
    ))
    .bind(bank_id)
    .bind(owner_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Bank details not found"));
    }
    Ok(response::message("Bank details deleted successfully"))
}
