use crate::{
    auth::auth::AuthUser,
    error::ApiError,
    model::attendance::{Attendance, Punch},
    response,
    utils::db_utils::{Field, FieldKind, build_update_sql, execute_update, into_object},
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::{info, warn};
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AttendanceQuery {
    /// Filter by employee ID
    pub employee_id: Option<u64>,
    /// First day, inclusive (YYYY-MM-DD)
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    /// Last day, inclusive (YYYY-MM-DD)
    #[param(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
}

const ATTENDANCE_FIELDS: &[Field] = &[
    Field::required("is_valid", FieldKind::Bool),
    Field::optional("remarks", FieldKind::Text),
];

const ATTENDANCE_COLUMNS: &str =
    "id, employee_id, date, check_in, lunch_in, lunch_out, check_out, is_valid, remarks";

async fn fetch_today(pool: &MySqlPool, employee_id: u64) -> Result<Option<Attendance>, sqlx::Error> {
    sqlx::query_as::<_, Attendance>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE employee_id = ? AND date = CURDATE()"
    ))
    .bind(employee_id)
    .fetch_optional(pool)
    .await
}

/// Writes one punch to today's row and reports the rows touched. Check-in
/// relies on the `(employee_id, date)` key; the other punches only update a
/// row whose guard columns are still NULL.
async fn apply_punch(pool: &MySqlPool, employee_id: u64, punch: Punch) -> Result<u64, ApiError> {
    let affected = match punch {
        Punch::CheckIn => sqlx::query(
            "INSERT INTO attendance (employee_id, date, check_in) VALUES (?, CURDATE(), NOW())",
        )
        .bind(employee_id)
        .execute(pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                ApiError::bad_request("Already checked in today")
            }
            _ => ApiError::from(e),
        })?
        .rows_affected(),
        _ => {
            let sql = format!(
                "UPDATE attendance SET {} = NOW() WHERE employee_id = ? AND date = CURDATE() AND {}",
                punch.column(),
                punch.update_guard()
            );
            sqlx::query(&sql)
                .bind(employee_id)
                .execute(pool)
                .await?
                .rows_affected()
        }
    };
    Ok(affected)
}

/// Applies one punch to today's row. The ordering check runs first for a
/// precise message; the statement itself is guarded so a concurrent
/// duplicate cannot slip through between the read and the write.
async fn record_punch(pool: &MySqlPool, employee_id: u64, punch: Punch) -> Result<Attendance, ApiError> {
    let today = fetch_today(pool, employee_id).await?;
    punch.check(today.as_ref()).map_err(ApiError::bad_request)?;

    let affected = apply_punch(pool, employee_id, punch).await?;

    if affected == 0 {
        // lost a race; report whatever rule the current row now breaks
        let current = fetch_today(pool, employee_id).await?;
        let reason = punch
            .check(current.as_ref())
            .err()
            .unwrap_or("Attendance was updated concurrently, try again");
        warn!(employee_id, %punch, reason, "Punch rejected by guard");
        return Err(ApiError::bad_request(reason));
    }

    info!(employee_id, %punch, "Attendance punch recorded");

    fetch_today(pool, employee_id)
        .await?
        .ok_or_else(|| ApiError::internal("Attendance row missing after punch"))
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    responses(
        (status = 200, description = "Checked in successfully", body = Attendance),
        (status = 400, description = "Already checked in today", body = Object, example = json!({
            "status": false,
            "message": "Already checked in today",
            "data": null
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_in(auth: AuthUser, pool: web::Data<MySqlPool>) -> Result<HttpResponse, ApiError> {
    let row = record_punch(pool.get_ref(), auth.employee_id, Punch::CheckIn).await?;
    Ok(response::ok("Checked in successfully", row))
}

#[utoipa::path(
    post,
    path = "/api/attendance/lunch-in",
    responses(
        (status = 200, description = "Lunch started", body = Attendance),
        (status = 400, description = "No check-in, lunch already started or already checked out")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn lunch_in(auth: AuthUser, pool: web::Data<MySqlPool>) -> Result<HttpResponse, ApiError> {
    let row = record_punch(pool.get_ref(), auth.employee_id, Punch::LunchIn).await?;
    Ok(response::ok("Lunch started successfully", row))
}

#[utoipa::path(
    post,
    path = "/api/attendance/lunch-out",
    responses(
        (status = 200, description = "Lunch ended", body = Attendance),
        (status = 400, description = "Lunch not started, already ended or already checked out")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn lunch_out(auth: AuthUser, pool: web::Data<MySqlPool>) -> Result<HttpResponse, ApiError> {
    let row = record_punch(pool.get_ref(), auth.employee_id, Punch::LunchOut).await?;
    Ok(response::ok("Lunch ended successfully", row))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    responses(
        (status = 200, description = "Checked out successfully", body = Attendance),
        (status = 400, description = "No check-in found, lunch in progress or already checked out")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_out(auth: AuthUser, pool: web::Data<MySqlPool>) -> Result<HttpResponse, ApiError> {
    let row = record_punch(pool.get_ref(), auth.employee_id, Punch::CheckOut).await?;
    Ok(response::ok("Checked out successfully", row))
}

#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses((status = 200, description = "Caller's row for today, or null")),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today(auth: AuthUser, pool: web::Data<MySqlPool>) -> Result<HttpResponse, ApiError> {
    let row = fetch_today(pool.get_ref(), auth.employee_id).await?;
    Ok(response::ok("Today's attendance fetched successfully", row))
}

#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Attendance rows, newest first"),
        (status = 400, description = "from is after to")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    pool: web::Data<MySqlPool>,
    query: web::Query<AttendanceQuery>,
) -> Result<HttpResponse, ApiError> {
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(ApiError::bad_request("from cannot be after to"));
        }
    }

    let mut sql = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE 1=1");
    if query.employee_id.is_some() {
        sql.push_str(" AND employee_id = ?");
    }
    if query.from.is_some() {
        sql.push_str(" AND date >= ?");
    }
    if query.to.is_some() {
        sql.push_str(" AND date <= ?");
    }
    sql.push_str(" ORDER BY date DESC, employee_id");

    let mut q = sqlx::query_as::<_, Attendance>(&sql);
    if let Some(employee_id) = query.employee_id {
        q = q.bind(employee_id);
    }
    if let Some(from) = query.from {
        q = q.bind(from);
    }
    if let Some(to) = query.to {
        q = q.bind(to);
    }

    let rows = q.fetch_all(pool.get_ref()).await?;
    Ok(response::ok("Attendance fetched successfully", rows))
}

/// Marks a row valid or invalid and records a remark.
#[utoipa::path(
    put,
    path = "/api/attendance/{attendance_id}",
    params(("attendance_id" = u64, Path, description = "Attendance row ID")),
    responses(
        (status = 200, description = "Attendance updated", body = Attendance),
        (status = 400, description = "Field outside is_valid / remarks"),
        (status = 404, description = "Attendance not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn update_attendance(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let attendance_id = path.into_inner();
    let payload = into_object(body.into_inner())?;
    let update = build_update_sql("attendance", &payload, ATTENDANCE_FIELDS, "id", attendance_id)?;

    let select = format!("SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?");

    let exists = sqlx::query_as::<_, Attendance>(&select)
        .bind(attendance_id)
        .fetch_optional(pool.get_ref())
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("Attendance not found"));
    }

    execute_update(pool.get_ref(), update).await?;

    let row = sqlx::query_as::<_, Attendance>(&select)
        .bind(attendance_id)
        .fetch_one(pool.get_ref())
        .await?;

    Ok(response::ok("Attendance updated successfully", row))
}
