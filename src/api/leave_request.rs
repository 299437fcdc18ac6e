use crate::{
    auth::auth::AuthUser,
    error::{ApiError, require_fields},
    model::leave_request::{LeaveRequest, LeaveStatus},
    response,
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = "2026-01-01", format = "date", value_type = String)]
    pub leave_date: NaiveDate,
    #[schema(example = "Family function")]
    pub reason: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LeaveStatusReq {
    pub status: LeaveStatus,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveList {
    pub leaves: Vec<LeaveRequest>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LeaveFilter {
    /// Filter by employee ID
    pub employee_id: Option<u64>,
    /// Filter by leave status
    #[param(value_type = Option<String>, example = "pending")]
    pub status: Option<LeaveStatus>,
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    /// Pagination per page number
    pub per_page: Option<u32>,
}

// Helper enum for typed SQLx binding
enum FilterValue<'a> {
    U64(u64),
    Str(&'a str),
}

const LEAVE_COLUMNS: &str = "id, employee_id, leave_date, reason, status, reviewed_by, created_at";

async fn fetch_leave(pool: &MySqlPool, id: u64) -> Result<Option<LeaveRequest>, sqlx::Error> {
    sqlx::query_as::<_, LeaveRequest>(&format!("SELECT {LEAVE_COLUMNS} FROM leave_requests WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/* =========================
Create leave request
========================= */
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(
        content = CreateLeave,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveRequest),
        (status = 400, description = "Missing reason or duplicate date"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeave>,
) -> Result<HttpResponse, ApiError> {
    require_fields(&[("reason", &payload.reason)])?;

    let employee_id = auth.employee_id;

    let open = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM leave_requests WHERE employee_id = ? AND leave_date = ? AND status <> ?",
    )
    .bind(employee_id)
    .bind(payload.leave_date)
    .bind(LeaveStatus::Rejected.as_ref())
    .fetch_one(pool.get_ref())
    .await?;
    if open > 0 {
        return Err(ApiError::bad_request("Leave already requested for this date"));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests (employee_id, leave_date, reason, status)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(payload.leave_date)
    .bind(payload.reason.trim())
    .bind(LeaveStatus::Pending.as_ref())
    .execute(pool.get_ref())
    .await?;

    let leave_id = result.last_insert_id();
    info!(leave_id, employee_id, date = %payload.leave_date, "Leave requested");

    let leave = fetch_leave(pool.get_ref(), leave_id)
        .await?
        .ok_or_else(|| ApiError::internal("Leave request vanished after insert"))?;

    Ok(response::created("Leave request submitted", leave))
}

/* =========================
Review leave
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/status",
    params(("leave_id" = u64, Path, description = "ID of the leave request")),
    request_body = LeaveStatusReq,
    responses(
        (status = 200, description = "Leave status updated", body = LeaveRequest),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn update_leave_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<LeaveStatusReq>,
) -> Result<HttpResponse, ApiError> {
    let leave_id = path.into_inner();

    // moving back to pending clears the reviewer
    let reviewer = match payload.status {
        LeaveStatus::Pending => None,
        _ => Some(auth.employee_id),
    };

    if fetch_leave(pool.get_ref(), leave_id).await?.is_none() {
        return Err(ApiError::not_found("Leave request not found"));
    }

    sqlx::query("UPDATE leave_requests SET status = ?, reviewed_by = ? WHERE id = ?")
        .bind(payload.status.as_ref())
        .bind(reviewer)
        .bind(leave_id)
        .execute(pool.get_ref())
        .await?;

    info!(leave_id, status = %payload.status, reviewer = ?reviewer, "Leave reviewed");

    let leave = fetch_leave(pool.get_ref(), leave_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Leave request not found"))?;

    Ok(response::ok(format!("Leave {}", payload.status), leave))
}

#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(("leave_id" = u64, Path, description = "ID of the leave request to fetch")),
    responses(
        (status = 200, description = "Leave request found", body = LeaveRequest),
        (status = 404, description = "Leave request not found", body = Object, example = json!({
            "status": false,
            "message": "Leave request not found",
            "data": null
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let leave = fetch_leave(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Leave request not found"))?;

    Ok(response::ok("Leave request fetched successfully", leave))
}

/// Paginated leave applications
#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveFilter),
    responses((status = 200, description = "Paginated leave list", body = LeaveList)),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_list(
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> Result<HttpResponse, ApiError> {
    // -------------------------
    // Pagination
    // -------------------------
    let per_page = query.per_page.unwrap_or(10).clamp(1, 100);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * per_page;

    // -------------------------
    // WHERE clause
    // -------------------------
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    if let Some(emp_id) = query.employee_id {
        where_sql.push_str(" AND employee_id = ?");
        args.push(FilterValue::U64(emp_id));
    }

    if let Some(status) = query.status.as_ref() {
        where_sql.push_str(" AND status = ?");
        args.push(FilterValue::Str(status.as_ref()));
    }

    // -------------------------
    // COUNT query
    // -------------------------
    let count_sql = format!("SELECT COUNT(*) FROM leave_requests{where_sql}");

    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    for arg in &args {
        count_q = match arg {
            FilterValue::U64(v) => count_q.bind(*v),
            FilterValue::Str(s) => count_q.bind(*s),
        };
    }
    let total = count_q.fetch_one(pool.get_ref()).await?;

    // -------------------------
    // DATA query
    // -------------------------
    let data_sql = format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests{where_sql} ORDER BY created_at DESC LIMIT ? OFFSET ?"
    );

    let mut data_q = sqlx::query_as::<_, LeaveRequest>(&data_sql);
    for arg in args {
        data_q = match arg {
            FilterValue::U64(v) => data_q.bind(v),
            FilterValue::Str(s) => data_q.bind(s),
        };
    }

    let leaves = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(response::ok(
        "Leave requests fetched successfully",
        LeaveList {
            leaves,
            page,
            per_page,
            total,
        },
    ))
}

/// Withdraws the caller's own request while it is still pending.
#[utoipa::path(
    delete,
    path = "/api/leave/{leave_id}",
    params(("leave_id" = u64, Path, description = "ID of the leave request")),
    responses(
        (status = 200, description = "Leave request withdrawn"),
        (status = 400, description = "Request already reviewed"),
        (status = 403, description = "Request belongs to another employee"),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn delete_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let leave_id = path.into_inner();

    let leave = fetch_leave(pool.get_ref(), leave_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Leave request not found"))?;

    if leave.employee_id != auth.employee_id {
        return Err(ApiError::forbidden("Only the requester can withdraw a leave request"));
    }

    let result = sqlx::query("DELETE FROM leave_requests WHERE id = ? AND status = ?")
        .bind(leave_id)
        .bind(LeaveStatus::Pending.as_ref())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::bad_request("Only pending leave requests can be withdrawn"));
    }

    Ok(response::message("Leave request withdrawn"))
}
