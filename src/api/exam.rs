use std::collections::HashMap;

use crate::{
    error::{ApiError, require_fields},
    model::exam::{Exam, ExamCategory, ExamCollege},
    response,
    utils::db_utils::{
        Field, FieldKind, build_update_sql, count_existing, execute_update, insert_links,
        into_object, replace_links, take_id_list,
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, MySqlPool};
use tracing::info;

#[derive(Deserialize)]
pub struct CreateCategory {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateExam {
    pub exam_code: String,
    pub title: String,
    pub duration_minutes: u32,
    pub question_count: u32,
    pub file_link: Option<String>,
    #[serde(default)]
    pub category_ids: Vec<u64>,
}

#[derive(Deserialize)]
pub struct MapCollege {
    pub college_id: u64,
    pub batch: String,
    pub issue_date: NaiveDate,
}

#[derive(Serialize)]
pub struct ExamDetail {
    #[serde(flatten)]
    pub exam: Exam,
    pub categories: Vec<ExamCategory>,
}

#[derive(FromRow)]
struct ExamCategoryRow {
    exam_id: u64,
    #[sqlx(flatten)]
    category: ExamCategory,
}

const EXAM_FIELDS: &[Field] = &[
    Field::required("title", FieldKind::Text),
    Field::required("duration_minutes", FieldKind::Integer),
    Field::required("question_count", FieldKind::Integer),
    Field::optional("file_link", FieldKind::Text),
];

const EXAM_COLUMNS: &str =
    "id, exam_code, title, duration_minutes, question_count, file_link, created_at";

const MAPPING_SELECT: &str = r#"
    SELECT ec.id, ec.exam_id, ec.college_id, e.exam_code, c.code AS college_code,
           ec.batch, ec.issue_date
    FROM exam_colleges ec
    JOIN exams e ON e.id = ec.exam_id
    JOIN colleges c ON c.id = ec.college_id
"#;

/* =========================
Categories
========================= */

pub async fn add_category(
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateCategory>,
) -> Result<HttpResponse, ApiError> {
    require_fields(&[("name", &payload.name)])?;
    let name = payload.name.trim();

    let taken = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM exam_categories WHERE name = ?")
        .bind(name)
        .fetch_one(pool.get_ref())
        .await?;
    if taken > 0 {
        return Err(ApiError::conflict("Category already exists"));
    }

    let result = sqlx::query("INSERT INTO exam_categories (name) VALUES (?)")
        .bind(name)
        .execute(pool.get_ref())
        .await?;

    Ok(response::created(
        "Category added successfully",
        ExamCategory {
            id: result.last_insert_id(),
            name: name.to_string(),
        },
    ))
}

pub async fn list_categories(pool: web::Data<MySqlPool>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, ExamCategory>("SELECT id, name FROM exam_categories ORDER BY name")
        .fetch_all(pool.get_ref())
        .await?;
    Ok(response::ok("Categories fetched successfully", rows))
}

pub async fn delete_category(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let result = sqlx::query("DELETE FROM exam_categories WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Category not found"));
    }
    Ok(response::message("Category deleted successfully"))
}

/* =========================
Exams
========================= */

async fn categories_by_exam(
    pool: &MySqlPool,
    exam_ids: &[u64],
) -> Result<HashMap<u64, Vec<ExamCategory>>, sqlx::Error> {
    let mut grouped: HashMap<u64, Vec<ExamCategory>> = HashMap::new();
    if exam_ids.is_empty() {
        return Ok(grouped);
    }

    let placeholders = vec!["?"; exam_ids.len()].join(", ");
    let sql = format!(
        r#"
        SELECT m.exam_id, c.id, c.name
        FROM exam_category_map m
        JOIN exam_categories c ON c.id = m.category_id
        WHERE m.exam_id IN ({placeholders})
        ORDER BY c.name
        "#
    );

    let mut q = sqlx::query_as::<_, ExamCategoryRow>(&sql);
    for id in exam_ids {
        q = q.bind(*id);
    }

    for row in q.fetch_all(pool).await? {
        grouped.entry(row.exam_id).or_default().push(row.category);
    }
    Ok(grouped)
}

async fn fetch_exam(pool: &MySqlPool, exam_id: u64) -> Result<Option<ExamDetail>, sqlx::Error> {
    let exam = sqlx::query_as::<_, Exam>(&format!("SELECT {EXAM_COLUMNS} FROM exams WHERE id = ?"))
        .bind(exam_id)
        .fetch_optional(pool)
        .await?;

    let Some(exam) = exam else {
        return Ok(None);
    };

    let categories = categories_by_exam(pool, &[exam.id])
        .await?
        .remove(&exam.id)
        .unwrap_or_default();

    Ok(Some(ExamDetail { exam, categories }))
}

async fn ensure_categories_exist(pool: &MySqlPool, ids: &[u64]) -> Result<(), ApiError> {
    if count_existing(pool, "exam_categories", ids).await? != ids.len() {
        return Err(ApiError::bad_request("One or more categories do not exist"));
    }
    Ok(())
}

fn check_counts(duration_minutes: u32, question_count: u32) -> Result<(), ApiError> {
    if duration_minutes == 0 || question_count == 0 {
        return Err(ApiError::bad_request(
            "duration_minutes and question_count must be positive",
        ));
    }
    Ok(())
}

pub async fn add_exam(
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateExam>,
) -> Result<HttpResponse, ApiError> {
    require_fields(&[("exam_code", &payload.exam_code), ("title", &payload.title)])?;
    check_counts(payload.duration_minutes, payload.question_count)?;
    let code = payload.exam_code.trim();

    let mut category_ids = payload.category_ids.clone();
    category_ids.sort_unstable();
    category_ids.dedup();

    let taken = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM exams WHERE exam_code = ?")
        .bind(code)
        .fetch_one(pool.get_ref())
        .await?;
    if taken > 0 {
        return Err(ApiError::conflict("Exam code already exists"));
    }

    ensure_categories_exist(pool.get_ref(), &category_ids).await?;

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO exams (exam_code, title, duration_minutes, question_count, file_link)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(code)
    .bind(payload.title.trim())
    .bind(payload.duration_minutes)
    .bind(payload.question_count)
    .bind(&payload.file_link)
    .execute(&mut *tx)
    .await?;
    let exam_id = result.last_insert_id();

    insert_links(&mut tx, "exam_category_map", "exam_id", exam_id, "category_id", &category_ids).await?;

    tx.commit().await?;

    info!(exam_id, code, categories = category_ids.len(), "Exam added");

    let exam = fetch_exam(pool.get_ref(), exam_id)
        .await?
        .ok_or_else(|| ApiError::internal("Exam vanished after insert"))?;

    Ok(response::created("Exam added successfully", exam))
}

pub async fn list_exams(pool: web::Data<MySqlPool>) -> Result<HttpResponse, ApiError> {
    let exams = sqlx::query_as::<_, Exam>(&format!("SELECT {EXAM_COLUMNS} FROM exams ORDER BY created_at DESC"))
        .fetch_all(pool.get_ref())
        .await?;

    let ids: Vec<u64> = exams.iter().map(|e| e.id).collect();
    let mut categories = categories_by_exam(pool.get_ref(), &ids).await?;

    let detailed: Vec<ExamDetail> = exams
        .into_iter()
        .map(|exam| {
            let categories = categories.remove(&exam.id).unwrap_or_default();
            ExamDetail { exam, categories }
        })
        .collect();

    Ok(response::ok("Exams fetched successfully", detailed))
}

pub async fn get_exam(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let exam = fetch_exam(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Exam not found"))?;

    Ok(response::ok("Exam fetched successfully", exam))
}

/// Updates exam columns and optionally replaces `category_ids`.
pub async fn update_exam(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let exam_id = path.into_inner();
    let mut payload = into_object(body.into_inner())?;
    let category_ids = take_id_list(&mut payload, "category_ids")?;

    if payload.is_empty() && category_ids.is_none() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }

    for key in ["duration_minutes", "question_count"] {
        if let Some(v) = payload.get(key) {
            if v.as_u64().filter(|n| *n > 0 && *n <= u32::MAX as u64).is_none() {
                return Err(ApiError::bad_request(format!("{key} must be a positive integer")));
            }
        }
    }

    let update = if payload.is_empty() {
        None
    } else {
        Some(build_update_sql("exams", &payload, EXAM_FIELDS, "id", exam_id)?)
    };

    if let Some(ids) = &category_ids {
        ensure_categories_exist(pool.get_ref(), ids).await?;
    }

    let mut tx = pool.begin().await?;

    let exists = sqlx::query_scalar::<_, u64>("SELECT id FROM exams WHERE id = ? FOR UPDATE")
        .bind(exam_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("Exam not found"));
    }

    if let Some(update) = update {
        execute_update(&mut *tx, update).await?;
    }
    if let Some(ids) = &category_ids {
        replace_links(&mut tx, "exam_category_map", "exam_id", exam_id, "category_id", ids).await?;
    }

    tx.commit().await?;

    let exam = fetch_exam(pool.get_ref(), exam_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Exam not found"))?;

    Ok(response::ok("Exam updated successfully", exam))
}

pub async fn delete_exam(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let result = sqlx::query("DELETE FROM exams WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Exam not found"));
    }
    Ok(response::message("Exam deleted successfully"))
}

/* =========================
College mappings
========================= */

pub async fn map_college(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<MapCollege>,
) -> Result<HttpResponse, ApiError> {
    let exam_id = path.into_inner();
    require_fields(&[("batch", &payload.batch)])?;
    let batch = payload.batch.trim();
    let pool = pool.get_ref();

    if count_existing(pool, "exams", &[exam_id]).await? == 0 {
        return Err(ApiError::not_found("Exam not found"));
    }
    if count_existing(pool, "colleges", &[payload.college_id]).await? == 0 {
        return Err(ApiError::not_found("College not found"));
    }

    let mapped = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM exam_colleges WHERE exam_id = ? AND college_id = ? AND batch = ?",
    )
    .bind(exam_id)
    .bind(payload.college_id)
    .bind(batch)
    .fetch_one(pool)
    .await?;
    if mapped > 0 {
        return Err(ApiError::conflict("Exam already mapped to this college batch"));
    }

    let result = sqlx::query(
        "INSERT INTO exam_colleges (exam_id, college_id, batch, issue_date) VALUES (?, ?, ?, ?)",
    )
    .bind(exam_id)
    .bind(payload.college_id)
    .bind(batch)
    .bind(payload.issue_date)
    .execute(pool)
    .await?;

    let mapping = sqlx::query_as::<_, ExamCollege>(&format!("{MAPPING_SELECT} WHERE ec.id = ?"))
        .bind(result.last_insert_id())
        .fetch_one(pool)
        .await?;

    info!(exam_id, college_id = payload.college_id, batch, "Exam mapped to college");

    Ok(response::created("Exam mapped successfully", mapping))
}

pub async fn list_exam_colleges(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, ExamCollege>(&format!(
        "{MAPPING_SELECT} WHERE ec.exam_id = ? ORDER BY ec.issue_date DESC"
    ))
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(response::ok("Exam mappings fetched successfully", rows))
}

pub async fn list_college_exams(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, ExamCollege>(&format!(
        "{MAPPING_SELECT} WHERE ec.college_id = ? ORDER BY ec.issue_date DESC"
    ))
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(response::ok("College exams fetched successfully", rows))
}

pub async fn unmap_college(
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
) -> Result<HttpResponse, ApiError> {
    let (exam_id, mapping_id) = path.into_inner();

    let result = sqlx::query("DELETE FROM exam_colleges WHERE id = ? AND exam_id = ?")
        .bind(mapping_id)
        .bind(exam_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Exam mapping not found"));
    }
    Ok(response::message("Exam unmapped successfully"))
}
