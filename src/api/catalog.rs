use std::collections::HashMap;

use crate::{
    error::{ApiError, require_fields},
    model::catalog::{Plan, Service},
    response,
    utils::db_utils::{
        Field, FieldKind, build_update_sql, count_existing, execute_update, insert_links,
        into_object, replace_links, take_id_list,
    },
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, MySqlPool};
use tracing::info;

#[derive(Deserialize)]
pub struct CreateService {
    pub code: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreatePlan {
    pub code: String,
    pub name: String,
    pub duration: String,
    pub file_link: Option<String>,
    #[serde(default)]
    pub service_ids: Vec<u64>,
}

#[derive(Serialize)]
pub struct PlanDetail {
    #[serde(flatten)]
    pub plan: Plan,
    pub services: Vec<Service>,
}

#[derive(FromRow)]
struct PlanServiceRow {
    plan_id: u64,
    #[sqlx(flatten)]
    service: Service,
}

const SERVICE_FIELDS: &[Field] = &[Field::required("name", FieldKind::Text)];

const PLAN_FIELDS: &[Field] = &[
    Field::required("name", FieldKind::Text),
    Field::required("duration", FieldKind::Text),
    Field::optional("file_link", FieldKind::Text),
];

const PLAN_COLUMNS: &str = "id, code, name, duration, file_link";

/* =========================
Services
========================= */

pub async fn add_service(
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateService>,
) -> Result<HttpResponse, ApiError> {
    require_fields(&[("code", &payload.code), ("name", &payload.name)])?;
    let code = payload.code.trim();

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM services WHERE code = ?")
        .bind(code)
        .fetch_one(pool.get_ref())
        .await?;
    if exists > 0 {
        return Err(ApiError::conflict("Service code already exists"));
    }

    let result = sqlx::query("INSERT INTO services (code, name) VALUES (?, ?)")
        .bind(code)
        .bind(payload.name.trim())
        .execute(pool.get_ref())
        .await?;

    Ok(response::created(
        "Service added successfully",
        Service {
            id: result.last_insert_id(),
            code: code.to_string(),
            name: payload.name.trim().to_string(),
        },
    ))
}

pub async fn list_services(pool: web::Data<MySqlPool>) -> Result<HttpResponse, ApiError> {
    let services = sqlx::query_as::<_, Service>("SELECT id, code, name FROM services ORDER BY code")
        .fetch_all(pool.get_ref())
        .await?;
    Ok(response::ok("Services fetched successfully", services))
}

pub async fn update_service(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let service_id = path.into_inner();
    let payload = into_object(body.into_inner())?;

    let update = build_update_sql("services", &payload, SERVICE_FIELDS, "id", service_id)?;
    execute_update(pool.get_ref(), update).await?;

    let service = sqlx::query_as::<_, Service>("SELECT id, code, name FROM services WHERE id = ?")
        .bind(service_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("Service not found"))?;

    Ok(response::ok("Service updated successfully", service))
}

pub async fn delete_service(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let result = sqlx::query("DELETE FROM services WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Service not found"));
    }
    Ok(response::message("Service deleted successfully"))
}

/* =========================
Plans
========================= */

/// Services of every plan in `plan_ids`, grouped by plan.
async fn services_by_plan(
    pool: &MySqlPool,
    plan_ids: &[u64],
) -> Result<HashMap<u64, Vec<Service>>, sqlx::Error> {
    let mut grouped: HashMap<u64, Vec<Service>> = HashMap::new();
    if plan_ids.is_empty() {
        return Ok(grouped);
    }

    let placeholders = vec!["?"; plan_ids.len()].join(", ");
    let sql = format!(
        r#"
        SELECT ps.plan_id, s.id, s.code, s.name
        FROM plan_services ps
        JOIN services s ON s.id = ps.service_id
        WHERE ps.plan_id IN ({placeholders})
        ORDER BY s.code
        "#
    );

    let mut q = sqlx::query_as::<_, PlanServiceRow>(&sql);
    for id in plan_ids {
        q = q.bind(*id);
    }

    for row in q.fetch_all(pool).await? {
        grouped.entry(row.plan_id).or_default().push(row.service);
    }
    Ok(grouped)
}

async fn fetch_plan(pool: &MySqlPool, plan_id: u64) -> Result<Option<PlanDetail>, sqlx::Error> {
    let plan = sqlx::query_as::<_, Plan>(&format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?"))
        .bind(plan_id)
        .fetch_optional(pool)
        .await?;

    let Some(plan) = plan else {
        return Ok(None);
    };

    let services = services_by_plan(pool, &[plan.id])
        .await?
        .remove(&plan.id)
        .unwrap_or_default();

    Ok(Some(PlanDetail { plan, services }))
}

async fn ensure_services_exist(pool: &MySqlPool, ids: &[u64]) -> Result<(), ApiError> {
    if count_existing(pool, "services", ids).await? != ids.len() {
        return Err(ApiError::bad_request("One or more services do not exist"));
    }
    Ok(())
}

pub async fn add_plan(
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePlan>,
) -> Result<HttpResponse, ApiError> {
    require_fields(&[
        ("code", &payload.code),
        ("name", &payload.name),
        ("duration", &payload.duration),
    ])?;
    let code = payload.code.trim();

    let mut service_ids = payload.service_ids.clone();
    service_ids.sort_unstable();
    service_ids.dedup();

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM plans WHERE code = ?")
        .bind(code)
        .fetch_one(pool.get_ref())
        .await?;
    if exists > 0 {
        return Err(ApiError::conflict("Plan code already exists"));
    }

    ensure_services_exist(pool.get_ref(), &service_ids).await?;

    let mut tx = pool.begin().await?;

    let result = sqlx::query("INSERT INTO plans (code, name, duration, file_link) VALUES (?, ?, ?, ?)")
        .bind(code)
        .bind(payload.name.trim())
        .bind(payload.duration.trim())
        .bind(&payload.file_link)
        .execute(&mut *tx)
        .await?;
    let plan_id = result.last_insert_id();

    insert_links(&mut tx, "plan_services", "plan_id", plan_id, "service_id", &service_ids).await?;

    tx.commit().await?;

    info!(plan_id, code, services = service_ids.len(), "Plan added");

    let plan = fetch_plan(pool.get_ref(), plan_id)
        .await?
        .ok_or_else(|| ApiError::internal("Plan vanished after insert"))?;

    Ok(response::created("Plan added successfully", plan))
}

pub async fn list_plans(pool: web::Data<MySqlPool>) -> Result<HttpResponse, ApiError> {
    let plans = sqlx::query_as::<_, Plan>(&format!("SELECT {PLAN_COLUMNS} FROM plans ORDER BY code"))
        .fetch_all(pool.get_ref())
        .await?;

    let ids: Vec<u64> = plans.iter().map(|p| p.id).collect();
    let mut services = services_by_plan(pool.get_ref(), &ids).await?;

    let detailed: Vec<PlanDetail> = plans
        .into_iter()
        .map(|plan| {
            let services = services.remove(&plan.id).unwrap_or_default();
            PlanDetail { plan, services }
        })
        .collect();

    Ok(response::ok("Plans fetched successfully", detailed))
}

pub async fn get_plan(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let plan = fetch_plan(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Plan not found"))?;

    Ok(response::ok("Plan fetched successfully", plan))
}

/// Updates plan columns and, when `service_ids` is present, replaces the
/// service set (delete-all-then-reinsert) in the same transaction.
pub async fn update_plan(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let plan_id = path.into_inner();
    let mut payload = into_object(body.into_inner())?;
    let service_ids = take_id_list(&mut payload, "service_ids")?;

    if payload.is_empty() && service_ids.is_none() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }

    let update = if payload.is_empty() {
        None
    } else {
        Some(build_update_sql("plans", &payload, PLAN_FIELDS, "id", plan_id)?)
    };

    if let Some(ids) = &service_ids {
        ensure_services_exist(pool.get_ref(), ids).await?;
    }

    let mut tx = pool.begin().await?;

    let exists = sqlx::query_scalar::<_, u64>("SELECT id FROM plans WHERE id = ? FOR UPDATE")
        .bind(plan_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("Plan not found"));
    }

    if let Some(update) = update {
        execute_update(&mut *tx, update).await?;
    }
    if let Some(ids) = &service_ids {
        replace_links(&mut tx, "plan_services", "plan_id", plan_id, "service_id", ids).await?;
    }

    tx.commit().await?;

    let plan = fetch_plan(pool.get_ref(), plan_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Plan not found"))?;

    Ok(response::ok("Plan updated successfully", plan))
}

pub async fn delete_plan(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let result = sqlx::query("DELETE FROM plans WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Plan not found"));
    }
    Ok(response::message("Plan deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::json_config;
    use crate::test_utils::{json_body, lazy_pool};
    use actix_web::{App, http::StatusCode, test};
    use serde_json::json;

    #[actix_web::test]
    async fn plan_update_needs_fields_or_services() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(json_config())
                .route("/plans/{id}", web::put().to(update_plan)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/plans/3")
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["message"], "No fields provided for update");

        let req = test::TestRequest::put()
            .uri("/plans/3")
            .set_json(json!({ "code": "P-NEW" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn plan_requires_duration() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(json_config())
                .route("/plans", web::post().to(add_plan)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/plans")
            .set_json(json!({ "code": "P1", "name": "Placement", "duration": "" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await["message"],
            "Missing required fields: duration"
        );
    }
}
