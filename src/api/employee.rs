use crate::{
    api::bank_detail::{self, CreateBankDetail, EMPLOYEE_ACCOUNTS},
    error::{ApiError, require_fields},
    model::employee::Employee,
    response,
    utils::{
        db_utils::{Field, FieldKind, build_update_sql, execute_update, into_object},
        pan::is_valid_pan,
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::MySqlPool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "EMP-014")]
    pub employee_code: String,
    #[schema(example = "Asha Rao")]
    pub name: String,
    #[schema(example = "asha@company.com", format = "email")]
    pub email: String,
    pub phone: Option<String>,
    #[schema(example = "ABCDE1234F")]
    pub pan_number: Option<String>,
    #[schema(example = "Trainer Coordinator")]
    pub designation: Option<String>,
    #[schema(example = "2026-01-01", format = "date", value_type = Option<String>)]
    pub date_of_joining: Option<NaiveDate>,
    pub salary: Option<f64>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Exact designation
    pub designation: Option<String>,
    /// Search by code, name or email
    pub search: Option<String>,
}

#[derive(Serialize)]
pub struct EmployeeList {
    pub employees: Vec<Employee>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

const EMPLOYEE_FIELDS: &[Field] = &[
    Field::required("employee_code", FieldKind::Text),
    Field::required("name", FieldKind::Text),
    Field::required("email", FieldKind::Text),
    Field::optional("phone", FieldKind::Text),
    Field::optional("pan_number", FieldKind::Text),
    Field::optional("designation", FieldKind::Text),
    Field::optional("date_of_joining", FieldKind::Date),
    Field::optional("salary", FieldKind::Float),
    Field::optional("address", FieldKind::Text),
];

const EMPLOYEE_COLUMNS: &str = "id, employee_code, name, email, phone, pan_number, designation, \
     date_of_joining, salary, address, created_at";

/// PAN numbers are stored upper-case and must be well formed when given.
pub(crate) fn normalize_pan(pan: Option<&str>) -> Result<Option<String>, ApiError> {
    match pan.map(str::trim).filter(|p| !p.is_empty()) {
        None => Ok(None),
        Some(p) => {
            let upper = p.to_uppercase();
            if is_valid_pan(&upper) {
                Ok(Some(upper))
            } else {
                Err(ApiError::bad_request(format!("Invalid PAN number: {p}")))
            }
        }
    }
}

/// Applies `normalize_pan` to a `pan_number` key of a dynamic update body.
pub(crate) fn normalize_pan_field(payload: &mut Map<String, Value>) -> Result<(), ApiError> {
    if let Some(Value::String(pan)) = payload.get("pan_number") {
        let normalized = normalize_pan(Some(pan))?;
        payload.insert(
            "pan_number".to_string(),
            normalized.map(Value::String).unwrap_or(Value::Null),
        );
    }
    Ok(())
}

async fn fetch_employee(pool: &MySqlPool, id: u64) -> Result<Option<Employee>, sqlx::Error> {
    sqlx::query_as::<_, Employee>(&format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created"),
        (status = 400, description = "Missing fields or invalid PAN"),
        (status = 409, description = "Employee code or email already exists")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployee>,
) -> Result<HttpResponse, ApiError> {
    require_fields(&[
        ("employee_code", &payload.employee_code),
        ("name", &payload.name),
        ("email", &payload.email),
    ])?;
    let pan = normalize_pan(payload.pan_number.as_deref())?;

    let taken = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM employees WHERE employee_code = ? OR email = ?",
    )
    .bind(payload.employee_code.trim())
    .bind(payload.email.trim())
    .fetch_one(pool.get_ref())
    .await?;
    if taken > 0 {
        return Err(ApiError::conflict("Employee code or email already exists"));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO employees
            (employee_code, name, email, phone, pan_number, designation,
             date_of_joining, salary, address)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_code.trim())
    .bind(payload.name.trim())
    .bind(payload.email.trim())
    .bind(&payload.phone)
    .bind(pan)
    .bind(&payload.designation)
    .bind(payload.date_of_joining)
    .bind(payload.salary)
    .bind(&payload.address)
    .execute(pool.get_ref())
    .await?;

    let id = result.last_insert_id();
    info!(employee_id = id, code = %payload.employee_code, "Employee created");

    let employee = fetch_employee(pool.get_ref(), id)
        .await?
        .ok_or_else(|| ApiError::internal("Employee vanished after insert"))?;

    Ok(response::created("Employee created successfully", employee))
}

#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses((status = 200, description = "Paginated employee list")),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * per_page;

    // ---------- build WHERE clause dynamically ----------
    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(designation) = query.designation.as_deref().filter(|d| !d.trim().is_empty()) {
        conditions.push("designation = ?");
        bindings.push(designation.trim().to_string());
    }

    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        conditions.push("(employee_code LIKE ? OR name LIKE ? OR email LIKE ?)");
        let like = format!("%{}%", search.trim());
        bindings.push(like.clone());
        bindings.push(like.clone());
        bindings.push(like);
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    // ---------- total count ----------
    let count_sql = format!("SELECT COUNT(*) FROM employees {where_clause}");
    debug!(sql = %count_sql, bindings = ?bindings, "Counting employees");

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for b in &bindings {
        count_query = count_query.bind(b);
    }
    let total = count_query.fetch_one(pool.get_ref()).await?;

    // ---------- data query ----------
    let data_sql = format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees {where_clause} ORDER BY id DESC LIMIT ? OFFSET ?"
    );
    debug!(sql = %data_sql, page, per_page, offset, "Fetching employees");

    let mut data_query = sqlx::query_as::<_, Employee>(&data_sql);
    for b in &bindings {
        data_query = data_query.bind(b);
    }
    let employees = data_query
        .bind(per_page as i64)
        .bind(offset as i64)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(response::ok(
        "Employees fetched successfully",
        EmployeeList {
            employees,
            page,
            per_page,
            total,
        },
    ))
}

#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let employee = fetch_employee(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    Ok(response::ok("Employee fetched successfully", employee))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee updated successfully"),
        (status = 400, description = "Unknown or invalid field"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = path.into_inner();

    let mut payload = into_object(body.into_inner())?;
    normalize_pan_field(&mut payload)?;
    let update = build_update_sql("employees", &payload, EMPLOYEE_FIELDS, "id", employee_id)?;

    // unchanged rows report 0 affected; existence is checked on its own
    if fetch_employee(pool.get_ref(), employee_id).await?.is_none() {
        return Err(ApiError::not_found("Employee not found"));
    }
    execute_update(pool.get_ref(), update).await?;

    let employee = fetch_employee(pool.get_ref(), employee_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee not found"))?;

    Ok(response::ok("Employee updated successfully", employee))
}

/// Delete Employee
#[utoipa::path(
    delete,
    path = "/api/employees/{employee_id}",
    params(("employee_id", Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Successfully deleted"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let employee_id = path.into_inner();

    let result = sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(employee_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Employee not found"));
    }

    info!(employee_id, "Employee deleted");
    Ok(response::message("Employee deleted successfully"))
}

/* =========================
Bank details
========================= */

pub async fn add_bank_detail(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<CreateBankDetail>,
) -> Result<HttpResponse, ApiError> {
    bank_detail::add(pool.get_ref(), &EMPLOYEE_ACCOUNTS, path.into_inner(), &payload).await
}

pub async fn list_bank_details(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    bank_detail::list(pool.get_ref(), &EMPLOYEE_ACCOUNTS, path.into_inner()).await
}

pub async fn update_bank_detail(
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let (employee_id, bank_id) = path.into_inner();
    bank_detail::update(pool.get_ref(), &EMPLOYEE_ACCOUNTS, employee_id, bank_id, body.into_inner())
        .await
}

pub async fn delete_bank_detail(
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
) -> Result<HttpResponse, ApiError> {
    let (employee_id, bank_id) = path.into_inner();
    bank_detail::delete(pool.get_ref(), &EMPLOYEE_ACCOUNTS, employee_id, bank_id).await
}
