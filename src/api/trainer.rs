use crate::{
    api::{
        bank_detail::{self, CreateBankDetail, TRAINER_ACCOUNTS},
        employee::{normalize_pan, normalize_pan_field},
    },
    error::{ApiError, require_fields},
    model::{
        bank_detail::BankDetail,
        catalog::Service,
        trainer::{Trainer, TrainerReview, TrainerStatus},
    },
    response,
    utils::db_utils::{
        Field, FieldKind, build_update_sql, count_existing, execute_update, insert_links,
        into_object, replace_links,
    },
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::MySqlPool;
use tracing::info;

#[derive(Deserialize)]
pub struct CreateTrainer {
    pub trainer_code: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub pan_number: Option<String>,
    pub status: Option<TrainerStatus>,
    pub location: Option<String>,
    pub charge: Option<f64>,
    #[serde(default)]
    pub service_ids: Vec<u64>,
    #[serde(default)]
    pub bank_details: Vec<CreateBankDetail>,
}

#[derive(Deserialize)]
pub struct TrainerQuery {
    pub status: Option<TrainerStatus>,
    pub location: Option<String>,
    pub service_id: Option<u64>,
}

#[derive(Deserialize)]
pub struct ServiceSet {
    pub service_ids: Vec<u64>,
}

#[derive(Deserialize)]
pub struct CreateReview {
    pub proposal_code: String,
    pub rating: u8,
    pub review: Option<String>,
}

#[derive(Serialize)]
pub struct TrainerDetail {
    #[serde(flatten)]
    pub trainer: Trainer,
    pub services: Vec<Service>,
    pub bank_details: Vec<BankDetail>,
}

const TRAINER_FIELDS: &[Field] = &[
    Field::required("name", FieldKind::Text),
    Field::required("email", FieldKind::Text),
    Field::optional("phone", FieldKind::Text),
    Field::optional("pan_number", FieldKind::Text),
    Field::required("status", FieldKind::Text),
    Field::optional("location", FieldKind::Text),
    Field::optional("charge", FieldKind::Float),
];

const TRAINER_COLUMNS: &str =
    "t.id, t.trainer_code, t.name, t.email, t.phone, t.pan_number, t.status, t.location, t.charge, t.created_at";

async fn fetch_trainer(pool: &MySqlPool, id: u64) -> Result<Option<Trainer>, sqlx::Error> {
    sqlx::query_as::<_, Trainer>(&format!("SELECT {TRAINER_COLUMNS} FROM trainers t WHERE t.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

async fn fetch_services(pool: &MySqlPool, trainer_id: u64) -> Result<Vec<Service>, sqlx::Error> {
    sqlx::query_as::<_, Service>(
        r#"
        SELECT s.id, s.code, s.name
        FROM trainer_services ts
        JOIN services s ON s.id = ts.service_id
        WHERE ts.trainer_id = ?
        ORDER BY s.code
        "#,
    )
    .bind(trainer_id)
    .fetch_all(pool)
    .await
}

async fn fetch_detail(pool: &MySqlPool, id: u64) -> Result<Option<TrainerDetail>, sqlx::Error> {
    let Some(trainer) = fetch_trainer(pool, id).await? else {
        return Ok(None);
    };
    let services = fetch_services(pool, id).await?;
    let bank_details = bank_detail::fetch_for(pool, &TRAINER_ACCOUNTS, id).await?;

    Ok(Some(TrainerDetail {
        trainer,
        services,
        bank_details,
    }))
}

async fn ensure_services_exist(pool: &MySqlPool, ids: &[u64]) -> Result<(), ApiError> {
    if count_existing(pool, "services", ids).await? != ids.len() {
        return Err(ApiError::bad_request("One or more services do not exist"));
    }
    Ok(())
}

/// A trainer's status column only ever holds the enum's text.
fn check_status_field(payload: &serde_json::Map<String, Value>) -> Result<(), ApiError> {
    match payload.get("status") {
        None => Ok(()),
        Some(v) => serde_json::from_value::<TrainerStatus>(v.clone())
            .map(|_| ())
            .map_err(|_| ApiError::bad_request("status must be 'active' or 'inactive'")),
    }
}

pub async fn add_trainer(
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTrainer>,
) -> Result<HttpResponse, ApiError> {
    require_fields(&[
        ("trainer_code", &payload.trainer_code),
        ("name", &payload.name),
        ("email", &payload.email),
    ])?;
    let pan = normalize_pan(payload.pan_number.as_deref())?;
    for detail in &payload.bank_details {
        detail.validate()?;
    }

    let mut service_ids = payload.service_ids.clone();
    service_ids.sort_unstable();
    service_ids.dedup();
    ensure_services_exist(pool.get_ref(), &service_ids).await?;

    let taken = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM trainers WHERE trainer_code = ? OR email = ?",
    )
    .bind(payload.trainer_code.trim())
    .bind(payload.email.trim())
    .fetch_one(pool.get_ref())
    .await?;
    if taken > 0 {
        return Err(ApiError::conflict("Trainer code or email already exists"));
    }

    let status = payload.status.unwrap_or(TrainerStatus::Active);

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO trainers
            (trainer_code, name, email, phone, pan_number, status, location, charge)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.trainer_code.trim())
    .bind(payload.name.trim())
    .bind(payload.email.trim())
    .bind(&payload.phone)
    .bind(pan)
    .bind(status.as_ref())
    .bind(&payload.location)
    .bind(payload.charge)
    .execute(&mut *tx)
    .await?;
    let trainer_id = result.last_insert_id();

    insert_links(&mut tx, "trainer_services", "trainer_id", trainer_id, "service_id", &service_ids).await?;
    for detail in &payload.bank_details {
        bank_detail::insert(&mut tx, &TRAINER_ACCOUNTS, trainer_id, detail).await?;
    }

    tx.commit().await?;

    info!(trainer_id, code = %payload.trainer_code, "Trainer added");

    let detail = fetch_detail(pool.get_ref(), trainer_id)
        .await?
        .ok_or_else(|| ApiError::internal("Trainer vanished after insert"))?;

    Ok(response::created("Trainer added successfully", detail))
}

pub async fn list_trainers(
    pool: web::Data<MySqlPool>,
    query: web::Query<TrainerQuery>,
) -> Result<HttpResponse, ApiError> {
    let mut sql = format!("SELECT DISTINCT {TRAINER_COLUMNS} FROM trainers t");
    if query.service_id.is_some() {
        sql.push_str(" JOIN trainer_services ts ON ts.trainer_id = t.id AND ts.service_id = ?");
    }
    sql.push_str(" WHERE 1=1");
    if query.status.is_some() {
        sql.push_str(" AND t.status = ?");
    }
    if query.location.is_some() {
        sql.push_str(" AND t.location LIKE ?");
    }
    sql.push_str(" ORDER BY t.name");

    let mut q = sqlx::query_as::<_, Trainer>(&sql);
    if let Some(service_id) = query.service_id {
        q = q.bind(service_id);
    }
    if let Some(status) = query.status {
        q = q.bind(status.as_ref().to_string());
    }
    if let Some(location) = query.location.as_deref() {
        q = q.bind(format!("%{}%", location.trim()));
    }

    let trainers = q.fetch_all(pool.get_ref()).await?;
    Ok(response::ok("Trainers fetched successfully", trainers))
}

pub async fn get_trainer(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let detail = fetch_detail(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Trainer not found"))?;

    Ok(response::ok("Trainer fetched successfully", detail))
}

pub async fn update_trainer(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let trainer_id = path.into_inner();

    let mut payload = into_object(body.into_inner())?;
    normalize_pan_field(&mut payload)?;
    check_status_field(&payload)?;
    let update = build_update_sql("trainers", &payload, TRAINER_FIELDS, "id", trainer_id)?;

    if fetch_trainer(pool.get_ref(), trainer_id).await?.is_none() {
        return Err(ApiError::not_found("Trainer not found"));
    }
    execute_update(pool.get_ref(), update).await?;

    let detail = fetch_detail(pool.get_ref(), trainer_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Trainer not found"))?;

    Ok(response::ok("Trainer updated successfully", detail))
}

pub async fn delete_trainer(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let trainer_id = path.into_inner();

    let result = sqlx::query("DELETE FROM trainers WHERE id = ?")
        .bind(trainer_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Trainer not found"));
    }

    info!(trainer_id, "Trainer deleted");
    Ok(response::message("Trainer deleted successfully"))
}

/// Replaces the trainer's service set.
pub async fn set_services(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<ServiceSet>,
) -> Result<HttpResponse, ApiError> {
    let trainer_id = path.into_inner();

    let mut ids = payload.into_inner().service_ids;
    ids.sort_unstable();
    ids.dedup();
    ensure_services_exist(pool.get_ref(), &ids).await?;

    let mut tx = pool.begin().await?;

    let exists = sqlx::query_scalar::<_, u64>("SELECT id FROM trainers WHERE id = ? FOR UPDATE")
        .bind(trainer_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("Trainer not found"));
    }

    replace_links(&mut tx, "trainer_services", "trainer_id", trainer_id, "service_id", &ids).await?;
    tx.commit().await?;

    let services = fetch_services(pool.get_ref(), trainer_id).await?;
    Ok(response::ok("Trainer services updated successfully", services))
}

/* =========================
Bank details
========================= */

pub async fn add_bank_detail(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<CreateBankDetail>,
) -> Result<HttpResponse, ApiError> {
    bank_detail::add(pool.get_ref(), &TRAINER_ACCOUNTS, path.into_inner(), &payload).await
}

pub async fn list_bank_details(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    bank_detail::list(pool.get_ref(), &TRAINER_ACCOUNTS, path.into_inner()).await
}

pub async fn update_bank_detail(
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let (trainer_id, bank_id) = path.into_inner();
    bank_detail::update(pool.get_ref(), &TRAINER_ACCOUNTS, trainer_id, bank_id, body.into_inner())
        .await
}

pub async fn delete_bank_detail(
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
) -> Result<HttpResponse, ApiError> {
    let (trainer_id, bank_id) = path.into_inner();
    bank_detail::delete(pool.get_ref(), &TRAINER_ACCOUNTS, trainer_id, bank_id).await
}

/* =========================
Reviews
========================= */

pub async fn add_review(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<CreateReview>,
) -> Result<HttpResponse, ApiError> {
    let trainer_id = path.into_inner();
    require_fields(&[("proposal_code", &payload.proposal_code)])?;
    if !(1..=5).contains(&payload.rating) {
        return Err(ApiError::bad_request("rating must be between 1 and 5"));
    }

    if fetch_trainer(pool.get_ref(), trainer_id).await?.is_none() {
        return Err(ApiError::not_found("Trainer not found"));
    }

    let proposal_code = payload.proposal_code.trim();
    let proposal_id = sqlx::query_scalar::<_, u64>("SELECT id FROM proposals WHERE proposal_code = ?")
        .bind(proposal_code)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::bad_request(format!("Proposal {proposal_code} does not exist")))?;

    let allocated = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM trainer_proposals WHERE trainer_id = ? AND proposal_id = ?",
    )
    .bind(trainer_id)
    .bind(proposal_id)
    .fetch_one(pool.get_ref())
    .await?;
    if allocated == 0 {
        return Err(ApiError::bad_request(
            "Trainer is not allocated to this proposal",
        ));
    }

    let result = sqlx::query(
        "INSERT INTO trainer_reviews (trainer_id, proposal_code, rating, review) VALUES (?, ?, ?, ?)",
    )
    .bind(trainer_id)
    .bind(proposal_code)
    .bind(payload.rating)
    .bind(&payload.review)
    .execute(pool.get_ref())
    .await?;

    let review = sqlx::query_as::<_, TrainerReview>(
        "SELECT id, trainer_id, proposal_code, rating, review, created_at FROM trainer_reviews WHERE id = ?",
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
    let reviews = sqlx::query_as::<_, TrainerReview>(
        r#"
        SELECT id, trainer_id, proposal_code, rating, review, created_at
        FROM trainer_reviews
        WHERE trainer_id = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(response::ok("Reviews fetched successfully", reviews))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::json_config;
    use crate::test_utils::{json_body, lazy_pool};
    use actix_web::{App, http::StatusCode};
    use actix_web::test::{TestRequest, call_service, init_service};
    use serde_json::json;

    #[test]
    fn status_field_must_be_a_known_state() {
        let ok = into_object(json!({ "status": "inactive" })).unwrap();
        assert!(check_status_field(&ok).is_ok());

        let bad = into_object(json!({ "status": "retired" })).unwrap();
        assert!(check_status_field(&bad).is_err());
    }

    #[actix_web::test]
    async fn rating_outside_one_to_five_is_rejected() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(json_config())
                .route("/trainers/{id}/reviews", web::post().to(add_review)),
        )
        .await;

        let req = TestRequest::post()
            .uri("/trainers/2/reviews")
            .set_json(json!({ "proposal_code": "PR-1", "rating": 6 }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["message"], "rating must be between 1 and 5");
    }

    #[actix_web::test]
    async fn bank_details_are_validated_with_the_trainer() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(json_config())
                .route("/trainers", web::post().to(add_trainer)),
        )
        .await;

        let req = TestRequest::post()
            .uri("/trainers")
            .set_json(json!({
                "trainer_code": "TR-1",
                "name": "Vikram",
                "email": "vikram@example.com",
                "bank_details": [{
                    "account_holder": "Vikram",
                    "account_number": "",
                    "ifsc_code": "SBIN0001",
                    "bank_name": "SBI"
                }]
            }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await["message"],
            "Missing required fields: account_number"
        );
    }
}
