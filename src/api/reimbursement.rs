use crate::{
    auth::auth::AuthUser,
    error::{ApiError, require_fields},
    model::reimbursement::{Expenditure, Reimbursement, ReimbursementReview, ReimbursementStatus},
    response,
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateExpenditure {
    pub expense_date: NaiveDate,
    pub category: String,
    pub description: Option<String>,
    pub amount: f64,
    pub bill_link: Option<String>,
}

impl CreateExpenditure {
    fn validate(&self) -> Result<(), ApiError> {
        require_fields(&[("category", &self.category)])?;
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ApiError::bad_request("amount must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
pub struct CreateReimbursement {
    pub reimbursement_code: String,
    /// Claimant; defaults to the caller
    pub employee_id: Option<u64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub expenditures: Vec<CreateExpenditure>,
}

#[derive(Deserialize)]
pub struct ReimbursementQuery {
    pub employee_id: Option<u64>,
    pub status: Option<ReimbursementStatus>,
}

#[derive(Deserialize)]
pub struct StatusReq {
    pub status: ReimbursementStatus,
}

#[derive(Deserialize)]
pub struct CreateComment {
    pub comment: String,
}

#[derive(Serialize)]
pub struct ReimbursementDetail {
    #[serde(flatten)]
    pub reimbursement: Reimbursement,
    pub total_amount: f64,
    pub expenditures: Vec<Expenditure>,
    pub reviews: Vec<ReimbursementReview>,
}

const REIMBURSEMENT_COLUMNS: &str =
    "id, reimbursement_code, employee_id, start_date, end_date, status, created_at";
const EXPENDITURE_COLUMNS: &str =
    "id, reimbursement_id, expense_date, category, description, amount, bill_link";

async fn insert_expenditure(
    conn: &mut MySqlConnection,
    reimbursement_id: u64,
    item: &CreateExpenditure,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO expenditures
            (reimbursement_id, expense_date, category, description, amount, bill_link)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(reimbursement_id)
    .bind(item.expense_date)
    .bind(item.category.trim())
    .bind(&item.description)
    .bind(item.amount)
    .bind(&item.bill_link)
    .execute(conn)
    .await?;

    Ok(result.last_insert_id())
}

async fn fetch_reimbursement(pool: &MySqlPool, id: u64) -> Result<Option<Reimbursement>, sqlx::Error> {
    sqlx::query_as::<_, Reimbursement>(&format!(
        "SELECT {REIMBURSEMENT_COLUMNS} FROM reimbursements WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

async fn fetch_detail(pool: &MySqlPool, id: u64) -> Result<Option<ReimbursementDetail>, sqlx::Error> {
    let Some(reimbursement) = fetch_reimbursement(pool, id).await? else {
        return Ok(None);
    };

    let expenditures = sqlx::query_as::<_, Expenditure>(&format!(
        "SELECT {EXPENDITURE_COLUMNS} FROM expenditures WHERE reimbursement_id = ? ORDER BY expense_date, id"
    ))
    .bind(id)
    .fetch_all(pool)
    .await?;

    let reviews = sqlx::query_as::<_, ReimbursementReview>(
        r#"
        SELECT id, reimbursement_id, reviewer_id, comment, created_at
        FROM reimbursement_reviews
        WHERE reimbursement_id = ?
        ORDER BY created_at
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let total_amount = expenditures.iter().map(|e| e.amount).sum();

    Ok(Some(ReimbursementDetail {
        reimbursement,
        total_amount,
        expenditures,
        reviews,
    }))
}

/// Every expense must fall inside the claim period.
fn check_period(
    start: NaiveDate,
    end: NaiveDate,
    items: &[CreateExpenditure],
) -> Result<(), ApiError> {
    if start > end {
        return Err(ApiError::bad_request("start_date cannot be after end_date"));
    }
    for item in items {
        item.validate()?;
        if item.expense_date < start || item.expense_date > end {
            return Err(ApiError::bad_request(format!(
                "Expense dated {} is outside the claim period",
                item.expense_date
            )));
        }
    }
    Ok(())
}

pub async fn create_reimbursement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateReimbursement>,
) -> Result<HttpResponse, ApiError> {
    require_fields(&[("reimbursement_code", &payload.reimbursement_code)])?;
    check_period(payload.start_date, payload.end_date, &payload.expenditures)?;

    let employee_id = payload.employee_id.unwrap_or(auth.employee_id);

    let employee = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees WHERE id = ?")
        .bind(employee_id)
        .fetch_one(pool.get_ref())
        .await?;
    if employee == 0 {
        return Err(ApiError::not_found("Employee not found"));
    }

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO reimbursements (reimbursement_code, employee_id, start_date, end_date, status)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.reimbursement_code.trim())
    .bind(employee_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(ReimbursementStatus::Requested.as_ref())
    .execute(&mut *tx)
    .await?;
    let reimbursement_id = result.last_insert_id();

    for item in &payload.expenditures {
        insert_expenditure(&mut tx, reimbursement_id, item).await?;
    }

    tx.commit().await?;

    info!(
        reimbursement_id,
        employee_id,
        items = payload.expenditures.len(),
        "Reimbursement requested"
    );

    let detail = fetch_detail(pool.get_ref(), reimbursement_id)
        .await?
        .ok_or_else(|| ApiError::internal("Reimbursement vanished after insert"))?;

    Ok(response::created("Reimbursement created successfully", detail))
}

pub async fn list_reimbursements(
    pool: web::Data<MySqlPool>,
    query: web::Query<ReimbursementQuery>,
) -> Result<HttpResponse, ApiError> {
    let mut sql = format!("SELECT {REIMBURSEMENT_COLUMNS} FROM reimbursements WHERE 1=1");
    if query.employee_id.is_some() {
        sql.push_str(" AND employee_id = ?");
    }
    if query.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut q = sqlx::query_as::<_, Reimbursement>(&sql);
    if let Some(employee_id) = query.employee_id {
        q = q.bind(employee_id);
    }
    if let Some(status) = query.status {
        q = q.bind(status.as_ref().to_string());
    }

    let rows = q.fetch_all(pool.get_ref()).await?;
    Ok(response::ok("Reimbursements fetched successfully", rows))
}

pub async fn get_reimbursement(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let detail = fetch_detail(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Reimbursement not found"))?;

    Ok(response::ok("Reimbursement fetched successfully", detail))
}

pub async fn update_status(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<StatusReq>,
) -> Result<HttpResponse, ApiError> {
    let reimbursement_id = path.into_inner();

    if fetch_reimbursement(pool.get_ref(), reimbursement_id).await?.is_none() {
        return Err(ApiError::not_found("Reimbursement not found"));
    }

    sqlx::query("UPDATE reimbursements SET status = ? WHERE id = ?")
        .bind(payload.status.as_ref())
        .bind(reimbursement_id)
        .execute(pool.get_ref())
        .await?;

    info!(reimbursement_id, status = %payload.status, "Reimbursement status updated");

    Ok(response::ok(
        "Reimbursement status updated successfully",
        json!({ "id": reimbursement_id, "status": payload.status }),
    ))
}

pub async fn delete_reimbursement(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let result = sqlx::query("DELETE FROM reimbursements WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Reimbursement not found"));
    }
    Ok(response::message("Reimbursement deleted successfully"))
}

/* =========================
Expenditures
========================= */

pub async fn add_expenditure(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<CreateExpenditure>,
) -> Result<HttpResponse, ApiError> {
    let reimbursement_id = path.into_inner();
    payload.validate()?;

    let claim = fetch_reimbursement(pool.get_ref(), reimbursement_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Reimbursement not found"))?;
    check_period(claim.start_date, claim.end_date, std::slice::from_ref(&*payload))?;

    let mut conn = pool.acquire().await?;
    let id = insert_expenditure(&mut conn, reimbursement_id, &payload).await?;

    let row = sqlx::query_as::<_, Expenditure>(&format!(
        "SELECT {EXPENDITURE_COLUMNS} FROM expenditures WHERE id = ?"
    ))
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(response::created("Expenditure added successfully", row))
}

pub async fn delete_expenditure(
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
) -> Result<HttpResponse, ApiError> {
    let (reimbursement_id, expenditure_id) = path.into_inner();

    let result = sqlx::query("DELETE FROM expenditures WHERE id = ? AND reimbursement_id = ?")
        .bind(expenditure_id)
        .bind(reimbursement_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Expenditure not found"));
    }
    Ok(response::message("Expenditure deleted successfully"))
}

/* =========================
Reviews
========================= */

pub async fn add_review(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<CreateComment>,
) -> Result<HttpResponse, ApiError> {
    let reimbursement_id = path.into_inner();
    require_fields(&[("comment", &payload.comment)])?;

    if fetch_reimbursement(pool.get_ref(), reimbursement_id).await?.is_none() {
        return Err(ApiError::not_found("Reimbursement not found"));
    }

    let result = sqlx::query(
        "INSERT INTO reimbursement_reviews (reimbursement_id, reviewer_id, comment) VALUES (?, ?, ?)",
    )
    .bind(reimbursement_id)
    .bind(auth.employee_id)
    .bind(payload.comment.trim())
    .execute(pool.get_ref())
    .await?;

    let review = sqlx::query_as::<_, ReimbursementReview>(
        "SELECT id, reimbursement_id, reviewer_id, comment, created_at FROM reimbursement_reviews WHERE id = ?",
    )
    .bind(result.last_insert_id())
    .fetch_one(pool.get_ref())
    .await?;

    Ok(response::created("Review added successfully", review))
}

pub async fn list_reviews(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let reviews = sqlx::query_as::<_, ReimbursementReview>(
        r#"
        SELECT id, reimbursement_id, reviewer_id, comment, created_at
        FROM reimbursement_reviews
        WHERE reimbursement_id = ?
        ORDER BY created_at
        "#,
    )
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(response::ok("Reviews fetched successfully", reviews))
}
