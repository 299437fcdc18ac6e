use crate::{
    error::{ApiError, require_fields},
    model::college::{College, Poc},
    response,
    utils::db_utils::{Field, FieldKind, build_update_sql, execute_update, into_object},
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{MySqlConnection, MySqlPool};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct CreatePoc {
    #[schema(example = "R. Kulkarni")]
    pub name: String,
    #[schema(example = "Training & Placement Officer")]
    pub designation: Option<String>,
    #[schema(example = "tpo@gec.edu.in")]
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateCollege {
    #[schema(example = "C001")]
    pub code: String,
    #[schema(example = "Government Engineering College")]
    pub name: String,
    #[schema(example = "Pune")]
    pub location: String,
    #[schema(example = "Maharashtra")]
    pub state: String,
    #[serde(default)]
    pub pocs: Vec<CreatePoc>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CollegeQuery {
    /// Filter by state
    pub state: Option<String>,
    /// Search by code or name
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct CollegeDetail {
    #[serde(flatten)]
    pub college: College,
    pub pocs: Vec<Poc>,
}

const COLLEGE_FIELDS: &[Field] = &[
    Field::required("name", FieldKind::Text),
    Field::required("location", FieldKind::Text),
    Field::required("state", FieldKind::Text),
];

const POC_FIELDS: &[Field] = &[
    Field::required("name", FieldKind::Text),
    Field::optional("designation", FieldKind::Text),
    Field::optional("email", FieldKind::Text),
    Field::optional("phone", FieldKind::Text),
];

const COLLEGE_COLUMNS: &str = "id, code, name, location, state, created_at";
const POC_COLUMNS: &str = "id, college_id, name, designation, email, phone";

async fn insert_poc(
    conn: &mut MySqlConnection,
    college_id: u64,
    poc: &CreatePoc,
) -> Result<u64, ApiError> {
    require_fields(&[("pocs.name", &poc.name)])?;

    let result = sqlx::query(
        "INSERT INTO college_pocs (college_id, name, designation, email, phone) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(college_id)
    .bind(poc.name.trim())
    .bind(&poc.designation)
    .bind(&poc.email)
    .bind(&poc.phone)
    .execute(conn)
    .await?;

    Ok(result.last_insert_id())
}

async fn fetch_detail(pool: &MySqlPool, id: u64) -> Result<Option<CollegeDetail>, ApiError> {
    let college = sqlx::query_as::<_, College>(&format!(
        "SELECT {COLLEGE_COLUMNS} FROM colleges WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(college) = college else {
        return Ok(None);
    };

    let pocs = sqlx::query_as::<_, Poc>(&format!(
        "SELECT {POC_COLUMNS} FROM college_pocs WHERE college_id = ? ORDER BY id"
    ))
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(Some(CollegeDetail { college, pocs }))
}

/// Add college (with optional POCs)
#[utoipa::path(
    post,
    path = "/api/colleges",
    request_body = CreateCollege,
    responses(
        (status = 201, description = "College added", body = CollegeDetail),
        (status = 400, description = "Missing required fields"),
        (status = 409, description = "College code already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "College"
)]
pub async fn add_college(
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateCollege>,
) -> Result<HttpResponse, ApiError> {
    require_fields(&[
        ("code", &payload.code),
        ("name", &payload.name),
        ("location", &payload.location),
        ("state", &payload.state),
    ])?;
    let code = payload.code.trim();

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM colleges WHERE code = ?")
        .bind(code)
        .fetch_one(pool.get_ref())
        .await?;
    if exists > 0 {
        return Err(ApiError::conflict("College code already exists"));
    }

    let mut tx = pool.begin().await?;

    let result = sqlx::query("INSERT INTO colleges (code, name, location, state) VALUES (?, ?, ?, ?)")
        .bind(code)
        .bind(payload.name.trim())
        .bind(payload.location.trim())
        .bind(payload.state.trim())
        .execute(&mut *tx)
        .await?;
    let college_id = result.last_insert_id();

    for poc in &payload.pocs {
        insert_poc(&mut tx, college_id, poc).await?;
    }

    tx.commit().await?;

    info!(college_id, code, pocs = payload.pocs.len(), "College added");

    let detail = fetch_detail(pool.get_ref(), college_id)
        .await?
        .ok_or_else(|| ApiError::internal("College vanished after insert"))?;

    Ok(response::created("College added successfully", detail))
}

#[utoipa::path(
    get,
    path = "/api/colleges",
    params(CollegeQuery),
    responses((status = 200, description = "College list", body = [College])),
    security(("bearer_auth" = [])),
    tag = "College"
)]
pub async fn list_colleges(
    pool: web::Data<MySqlPool>,
    query: web::Query<CollegeQuery>,
) -> Result<HttpResponse, ApiError> {
    let mut sql = format!("SELECT {COLLEGE_COLUMNS} FROM colleges WHERE 1=1");
    let mut args: Vec<String> = Vec::new();

    if let Some(state) = query.state.as_deref() {
        sql.push_str(" AND state = ?");
        args.push(state.to_string());
    }
    if let Some(search) = query.search.as_deref() {
        sql.push_str(" AND (code LIKE ? OR name LIKE ?)");
        let like = format!("%{}%", search);
        args.push(like.clone());
        args.push(like);
    }
    sql.push_str(" ORDER BY name");

    let mut q = sqlx::query_as::<_, College>(&sql);
    for arg in args {
        q = q.bind(arg);
    }

    let colleges = q.fetch_all(pool.get_ref()).await?;
    Ok(response::ok("Colleges fetched successfully", colleges))
}

#[utoipa::path(
    get,
    path = "/api/colleges/{college_id}",
    params(("college_id" = u64, Path, description = "College ID")),
    responses(
        (status = 200, description = "College with its POCs", body = CollegeDetail),
        (status = 404, description = "College not found")
    ),
    security(("bearer_auth" = [])),
    tag = "College"
)]
pub async fn get_college(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let detail = fetch_detail(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("College not found"))?;

    Ok(response::ok("College fetched successfully", detail))
}

pub async fn update_college(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let college_id = path.into_inner();
    let payload = into_object(body.into_inner())?;

    let update = build_update_sql("colleges", &payload, COLLEGE_FIELDS, "id", college_id)?;
    execute_update(pool.get_ref(), update).await?;

    let detail = fetch_detail(pool.get_ref(), college_id)
        .await?
        .ok_or_else(|| ApiError::not_found("College not found"))?;

    Ok(response::ok("College updated successfully", detail))
}

/// Deletes the college with its POCs and every proposal referencing its
/// code, all in one transaction. Proposal files, plan links, allocations and
/// reviews go with the proposals through the schema's cascades.
#[utoipa::path(
    delete,
    path = "/api/colleges/{college_id}",
    params(("college_id" = u64, Path, description = "College ID")),
    responses(
        (status = 200, description = "College deleted"),
        (status = 404, description = "College not found")
    ),
    security(("bearer_auth" = [])),
    tag = "College"
)]
pub async fn delete_college(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let college_id = path.into_inner();

    let mut tx = pool.begin().await?;

    let code = sqlx::query_scalar::<_, String>("SELECT code FROM colleges WHERE id = ? FOR UPDATE")
        .bind(college_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("College not found"))?;

    let pocs = sqlx::query("DELETE FROM college_pocs WHERE college_id = ?")
        .bind(college_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let proposals = sqlx::query("DELETE FROM proposals WHERE college_code = ?")
        .bind(&code)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM colleges WHERE id = ?")
        .bind(college_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(college_id, code = %code, pocs, proposals, "College deleted");

    Ok(response::message("College deleted successfully"))
}

/* =========================
Points of contact
========================= */

pub async fn add_poc(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<CreatePoc>,
) -> Result<HttpResponse, ApiError> {
    let college_id = path.into_inner();
    require_fields(&[("name", &payload.name)])?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM colleges WHERE id = ?")
        .bind(college_id)
        .fetch_one(pool.get_ref())
        .await?;
    if exists == 0 {
        return Err(ApiError::not_found("College not found"));
    }

    let mut conn = pool.acquire().await?;
    let poc_id = insert_poc(&mut conn, college_id, &payload).await?;

    let poc = sqlx::query_as::<_, Poc>(&format!("SELECT {POC_COLUMNS} FROM college_pocs WHERE id = ?"))
        .bind(poc_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(response::created("POC added successfully", poc))
}

pub async fn list_pocs(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let pocs = sqlx::query_as::<_, Poc>(&format!(
        "SELECT {POC_COLUMNS} FROM college_pocs WHERE college_id = ? ORDER BY id"
    ))
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(response::ok("POCs fetched successfully", pocs))
}

pub async fn update_poc(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let poc_id = path.into_inner();
    let payload = into_object(body.into_inner())?;

    let update = build_update_sql("college_pocs", &payload, POC_FIELDS, "id", poc_id)?;
    execute_update(pool.get_ref(), update).await?;

    let poc = sqlx::query_as::<_, Poc>(&format!("SELECT {POC_COLUMNS} FROM college_pocs WHERE id = ?"))
        .bind(poc_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("POC not found"))?;

    Ok(response::ok("POC updated successfully", poc))
}

pub async fn delete_poc(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let result = sqlx::query("DELETE FROM college_pocs WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("POC not found"));
    }

    Ok(response::message("POC deleted successfully"))
}
