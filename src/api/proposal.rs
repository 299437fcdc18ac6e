use crate::{
    auth::auth::AuthUser,
    error::{ApiError, require_fields},
    model::{
        catalog::Plan,
        proposal::{Proposal, ProposalFile, ProposalStatus},
        trainer::Allocation,
    },
    response,
    utils::{
        db_utils::{
            Field, FieldKind, build_update_sql, count_existing, execute_update, insert_links,
            into_object, replace_links, take_id_list,
        },
        mailer::Mailer,
        template::escape_xml,
    },
};
use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateProposal {
    pub college_code: String,
    pub proposal_code: String,
    pub issue_date: Option<NaiveDate>,
    pub duration: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Owning employee; defaults to the caller
    pub employee_id: Option<u64>,
    #[serde(default)]
    pub plan_ids: Vec<u64>,
}

#[derive(Deserialize)]
pub struct ProposalQuery {
    pub college_code: Option<String>,
    pub status: Option<ProposalStatus>,
    pub employee_id: Option<u64>,
}

#[derive(Deserialize)]
pub struct StatusReq {
    pub status: ProposalStatus,
}

#[derive(Deserialize)]
pub struct AddFile {
    pub file_link: String,
}

#[derive(Deserialize)]
pub struct AllocateTrainer {
    pub trainer_id: u64,
}

#[derive(Deserialize, Default)]
pub struct ProposalMail {
    pub subject: Option<String>,
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct ProposalDetail {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub plans: Vec<Plan>,
    pub files: Vec<ProposalFile>,
    pub trainers: Vec<Allocation>,
}

const PROPOSAL_FIELDS: &[Field] = &[
    Field::optional("issue_date", FieldKind::Date),
    Field::optional("duration", FieldKind::Text),
    Field::optional("start_date", FieldKind::Date),
    Field::optional("end_date", FieldKind::Date),
    Field::optional("employee_id", FieldKind::Integer),
];

const PROPOSAL_COLUMNS: &str = "id, proposal_uid, college_code, proposal_code, issue_date, \
     duration, start_date, end_date, status, employee_id, created_at";

pub(crate) const ALLOCATION_SELECT: &str = r#"
    SELECT tp.id, tp.trainer_id, tp.proposal_id, t.trainer_code, t.name AS trainer_name,
           p.proposal_code, tp.allocated_at
    FROM trainer_proposals tp
    JOIN trainers t ON t.id = tp.trainer_id
    JOIN proposals p ON p.id = tp.proposal_id
"#;

async fn fetch_proposal(pool: &MySqlPool, id: u64) -> Result<Option<Proposal>, sqlx::Error> {
    sqlx::query_as::<_, Proposal>(&format!("SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

async fn fetch_detail(pool: &MySqlPool, id: u64) -> Result<Option<ProposalDetail>, sqlx::Error> {
    let Some(proposal) = fetch_proposal(pool, id).await? else {
        return Ok(None);
    };

    let plans = sqlx::query_as::<_, Plan>(
        r#"
        SELECT pl.id, pl.code, pl.name, pl.duration, pl.file_link
        FROM proposal_plans pp
        JOIN plans pl ON pl.id = pp.plan_id
        WHERE pp.proposal_id = ?
        ORDER BY pl.code
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let files = sqlx::query_as::<_, ProposalFile>(
        "SELECT id, proposal_id, file_link, uploaded_at FROM proposal_files WHERE proposal_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let trainers = sqlx::query_as::<_, Allocation>(&format!(
        "{ALLOCATION_SELECT} WHERE tp.proposal_id = ? ORDER BY tp.allocated_at"
    ))
    .bind(id)
    .fetch_all(pool)
    .await?;

    Ok(Some(ProposalDetail {
        proposal,
        plans,
        files,
        trainers,
    }))
}

async fn ensure_plans_exist(pool: &MySqlPool, ids: &[u64]) -> Result<(), ApiError> {
    if count_existing(pool, "plans", ids).await? != ids.len() {
        return Err(ApiError::bad_request("One or more plans do not exist"));
    }
    Ok(())
}

fn check_date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), ApiError> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => {
            Err(ApiError::bad_request("start_date cannot be after end_date"))
        }
        _ => Ok(()),
    }
}

pub async fn add_proposal(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateProposal>,
) -> Result<HttpResponse, ApiError> {
    require_fields(&[
        ("college_code", &payload.college_code),
        ("proposal_code", &payload.proposal_code),
    ])?;
    check_date_range(payload.start_date, payload.end_date)?;

    let college_code = payload.college_code.trim();
    let proposal_code = payload.proposal_code.trim();

    let college = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM colleges WHERE code = ?")
        .bind(college_code)
        .fetch_one(pool.get_ref())
        .await?;
    if college == 0 {
        return Err(ApiError::not_found("College not found"));
    }

    let taken = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM proposals WHERE proposal_code = ?")
        .bind(proposal_code)
        .fetch_one(pool.get_ref())
        .await?;
    if taken > 0 {
        return Err(ApiError::conflict("Proposal code already exists"));
    }

    let mut plan_ids = payload.plan_ids.clone();
    plan_ids.sort_unstable();
    plan_ids.dedup();
    ensure_plans_exist(pool.get_ref(), &plan_ids).await?;

    let uid = Uuid::new_v4().to_string();
    let owner = payload.employee_id.unwrap_or(auth.employee_id);

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO proposals
            (proposal_uid, college_code, proposal_code, issue_date, duration,
             start_date, end_date, status, employee_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&uid)
    .bind(college_code)
    .bind(proposal_code)
    .bind(payload.issue_date)
    .bind(&payload.duration)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(ProposalStatus::Pending.as_ref())
    .bind(owner)
    .execute(&mut *tx)
    .await?;
    let proposal_id = result.last_insert_id();

    insert_links(&mut tx, "proposal_plans", "proposal_id", proposal_id, "plan_id", &plan_ids).await?;

    tx.commit().await?;

    info!(proposal_id, proposal_code, college_code, "Proposal added");

    let detail = fetch_detail(pool.get_ref(), proposal_id)
        .await?
        .ok_or_else(|| ApiError::internal("Proposal vanished after insert"))?;

    Ok(response::created("Proposal added successfully", detail))
}

pub async fn list_proposals(
    pool: web::Data<MySqlPool>,
    query: web::Query<ProposalQuery>,
) -> Result<HttpResponse, ApiError> {
    enum Arg<'a> {
        Str(&'a str),
        U64(u64),
    }

    let mut sql = format!("SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE 1=1");
    let mut args = Vec::new();

    if let Some(code) = query.college_code.as_deref() {
        sql.push_str(" AND college_code = ?");
        args.push(Arg::Str(code));
    }
    if let Some(status) = query.status.as_ref() {
        sql.push_str(" AND status = ?");
        args.push(Arg::Str(status.as_ref()));
    }
    if let Some(employee_id) = query.employee_id {
        sql.push_str(" AND employee_id = ?");
        args.push(Arg::U64(employee_id));
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut q = sqlx::query_as::<_, Proposal>(&sql);
    for arg in args {
        q = match arg {
            Arg::Str(s) => q.bind(s),
            Arg::U64(v) => q.bind(v),
        };
    }

    let proposals = q.fetch_all(pool.get_ref()).await?;
    Ok(response::ok("Proposals fetched successfully", proposals))
}

pub async fn list_college_proposals(
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let proposals = sqlx::query_as::<_, Proposal>(&format!(
        "SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE college_code = ? ORDER BY created_at DESC"
    ))
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(response::ok("Proposals fetched successfully", proposals))
}

pub async fn get_proposal(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let detail = fetch_detail(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Proposal not found"))?;

    Ok(response::ok("Proposal fetched successfully", detail))
}

pub async fn update_proposal(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let proposal_id = path.into_inner();
    let mut payload = into_object(body.into_inner())?;
    let plan_ids = take_id_list(&mut payload, "plan_ids")?;

    if payload.is_empty() && plan_ids.is_none() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }

    let update = if payload.is_empty() {
        None
    } else {
        Some(build_update_sql("proposals", &payload, PROPOSAL_FIELDS, "id", proposal_id)?)
    };

    if let Some(ids) = &plan_ids {
        ensure_plans_exist(pool.get_ref(), ids).await?;
    }

    let mut tx = pool.begin().await?;

    let exists = sqlx::query_scalar::<_, u64>("SELECT id FROM proposals WHERE id = ? FOR UPDATE")
        .bind(proposal_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("Proposal not found"));
    }

    if let Some(update) = update {
        execute_update(&mut *tx, update).await?;
    }
    if let Some(ids) = &plan_ids {
        replace_links(&mut tx, "proposal_plans", "proposal_id", proposal_id, "plan_id", ids).await?;
    }

    // the merged row must still describe a valid range
    let (start, end) = sqlx::query_as::<_, (Option<NaiveDate>, Option<NaiveDate>)>(
        "SELECT start_date, end_date FROM proposals WHERE id = ?",
    )
    .bind(proposal_id)
    .fetch_one(&mut *tx)
    .await?;
    check_date_range(start, end)?;

    tx.commit().await?;

    let detail = fetch_detail(pool.get_ref(), proposal_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Proposal not found"))?;

    Ok(response::ok("Proposal updated successfully", detail))
}

pub async fn update_status(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<StatusReq>,
) -> Result<HttpResponse, ApiError> {
    let proposal_id = path.into_inner();

    let result = sqlx::query("UPDATE proposals SET status = ? WHERE id = ?")
        .bind(payload.status.as_ref())
        .bind(proposal_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 && fetch_proposal(pool.get_ref(), proposal_id).await?.is_none() {
        return Err(ApiError::not_found("Proposal not found"));
    }

    info!(proposal_id, status = %payload.status, "Proposal status updated");

    Ok(response::ok(
        format!("Proposal moved to {}", payload.status),
        json!({ "id": proposal_id, "status": payload.status }),
    ))
}

pub async fn delete_proposal(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let result = sqlx::query("DELETE FROM proposals WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Proposal not found"));
    }
    Ok(response::message("Proposal deleted successfully"))
}

/* =========================
Proposal files
========================= */

/// Records an uploaded archive link; a pending proposal becomes `uploaded`.
pub async fn add_file(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<AddFile>,
) -> Result<HttpResponse, ApiError> {
    let proposal_id = path.into_inner();
    require_fields(&[("file_link", &payload.file_link)])?;

    let mut tx = pool.begin().await?;

    let exists = sqlx::query_scalar::<_, u64>("SELECT id FROM proposals WHERE id = ? FOR UPDATE")
        .bind(proposal_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(ApiError::not_found("Proposal not found"));
    }

    let result = sqlx::query("INSERT INTO proposal_files (proposal_id, file_link) VALUES (?, ?)")
        .bind(proposal_id)
        .bind(payload.file_link.trim())
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE proposals SET status = ? WHERE id = ? AND status = ?")
        .bind(ProposalStatus::Uploaded.as_ref())
        .bind(proposal_id)
        .bind(ProposalStatus::Pending.as_ref())
        .execute(&mut *tx)
        .await?;

    let file = sqlx::query_as::<_, ProposalFile>(
        "SELECT id, proposal_id, file_link, uploaded_at FROM proposal_files WHERE id = ?",
    )
    .bind(result.last_insert_id())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(response::created("File added successfully", file))
}

pub async fn list_files(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let files = sqlx::query_as::<_, ProposalFile>(
        "SELECT id, proposal_id, file_link, uploaded_at FROM proposal_files WHERE proposal_id = ? ORDER BY id",
    )
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(response::ok("Files fetched successfully", files))
}

pub async fn delete_file(
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
) -> Result<HttpResponse, ApiError> {
    let (proposal_id, file_id) = path.into_inner();

    let result = sqlx::query("DELETE FROM proposal_files WHERE id = ? AND proposal_id = ?")
        .bind(file_id)
        .bind(proposal_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("File not found"));
    }
    Ok(response::message("File deleted successfully"))
}

/* =========================
Trainer allocation
========================= */

pub async fn allocate_trainer(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<AllocateTrainer>,
) -> Result<HttpResponse, ApiError> {
    let proposal_id = path.into_inner();
    let pool = pool.get_ref();

    if count_existing(pool, "proposals", &[proposal_id]).await? == 0 {
        return Err(ApiError::not_found("Proposal not found"));
    }
    if count_existing(pool, "trainers", &[payload.trainer_id]).await? == 0 {
        return Err(ApiError::not_found("Trainer not found"));
    }

    let already = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM trainer_proposals WHERE trainer_id = ? AND proposal_id = ?",
    )
    .bind(payload.trainer_id)
    .bind(proposal_id)
    .fetch_one(pool)
    .await?;
    if already > 0 {
        return Err(ApiError::conflict("Trainer already allocated to this proposal"));
    }

    // the unique (trainer_id, proposal_id) key still guards concurrent calls
    let result = sqlx::query("INSERT INTO trainer_proposals (trainer_id, proposal_id) VALUES (?, ?)")
        .bind(payload.trainer_id)
        .bind(proposal_id)
        .execute(pool)
        .await?;

    let allocation = sqlx::query_as::<_, Allocation>(&format!("{ALLOCATION_SELECT} WHERE tp.id = ?"))
        .bind(result.last_insert_id())
        .fetch_one(pool)
        .await?;

    info!(proposal_id, trainer_id = payload.trainer_id, "Trainer allocated");

    Ok(response::created("Trainer allocated successfully", allocation))
}

pub async fn list_allocations(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, Allocation>(&format!(
        "{ALLOCATION_SELECT} WHERE tp.proposal_id = ? ORDER BY tp.allocated_at"
    ))
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(response::ok("Allocated trainers fetched successfully", rows))
}

pub async fn deallocate_trainer(
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
) -> Result<HttpResponse, ApiError> {
    let (proposal_id, trainer_id) = path.into_inner();

    let result = sqlx::query("DELETE FROM trainer_proposals WHERE proposal_id = ? AND trainer_id = ?")
        .bind(proposal_id)
        .bind(trainer_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Allocation not found"));
    }
    Ok(response::message("Trainer deallocated successfully"))
}

/* =========================
Proposal mail
========================= */

fn proposal_mail_body(proposal: &Proposal, message: Option<&str>) -> String {
    let mut body = format!(
        "<p>Dear Sir/Madam,</p><p>Please find our proposal <b>{}</b> for your institution.</p>",
        escape_xml(&proposal.proposal_code)
    );
    if let (Some(start), Some(end)) = (proposal.start_date, proposal.end_date) {
        body.push_str(&format!("<p>Proposed schedule: {start} to {end}.</p>"));
    }
    if let Some(message) = message.filter(|m| !m.trim().is_empty()) {
        body.push_str(&format!("<p>{}</p>", escape_xml(message.trim())));
    }
    body.push_str("<p>Regards,<br/>Training Team</p>");
    body
}

/// An empty body means defaults; anything else must be a valid options object.
fn parse_mail_options(body: &[u8]) -> Result<ProposalMail, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ProposalMail::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid mail options: {e}")))
}

/// Mails the proposal notice to every POC of the college that has an email
/// address and moves the proposal to `mail_sent`.
pub async fn send_proposal_mail(
    pool: web::Data<MySqlPool>,
    mailer: web::Data<Mailer>,
    path: web::Path<u64>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let proposal_id = path.into_inner();
    let payload = parse_mail_options(&body)?;

    if !mailer.is_enabled() {
        return Err(ApiError::internal("Mail relay not configured"));
    }

    let proposal = fetch_proposal(pool.get_ref(), proposal_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Proposal not found"))?;

    let recipients = sqlx::query_scalar::<_, String>(
        r#"
        SELECT DISTINCT pc.email
        FROM college_pocs pc
        JOIN colleges c ON c.id = pc.college_id
        WHERE c.code = ? AND pc.email IS NOT NULL AND pc.email <> ''
        "#,
    )
    .bind(&proposal.college_code)
    .fetch_all(pool.get_ref())
    .await?;

    if recipients.is_empty() {
        return Err(ApiError::bad_request("College has no POC with an email address"));
    }

    let subject = payload
        .subject
        .unwrap_or_else(|| format!("Training proposal {}", proposal.proposal_code));
    let body = proposal_mail_body(&proposal, payload.message.as_deref());

    let mut queued = Vec::with_capacity(recipients.len());
    for to in &recipients {
        match mailer.send_in_background(to, &subject, body.clone()) {
            Ok(()) => queued.push(to.clone()),
            Err(e) => warn!(proposal_id, to = %to, error = %e, "Skipping recipient"),
        }
    }

    if queued.is_empty() {
        return Err(ApiError::bad_request("No valid POC email address"));
    }

    sqlx::query("UPDATE proposals SET status = ? WHERE id = ?")
        .bind(ProposalStatus::MailSent.as_ref())
        .bind(proposal_id)
        .execute(pool.get_ref())
        .await?;

    info!(proposal_id, recipients = queued.len(), "Proposal mail queued");

    Ok(response::accepted(
        "Proposal mail queued",
        json!({ "recipients": queued, "status": ProposalStatus::MailSent }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::json_config;
    use crate::test_utils::{auth_user, db_pool, insert_employee, json_body, lazy_pool, unique};
    use actix_web::{App, HttpMessage, http::StatusCode};
    use actix_web::test::{TestRequest, call_service, init_service};

    #[actix_web::test]
    async fn update_rejects_status_and_bad_plan_list() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(json_config())
                .route("/proposals/{id}", web::put().to(update_proposal)),
        )
        .await;

        // status only moves through the dedicated endpoint
        let req = TestRequest::put()
            .uri("/proposals/3")
            .set_json(json!({ "status": "success" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["message"], "Field 'status' cannot be updated");

        let req = TestRequest::put()
            .uri("/proposals/3")
            .set_json(json!({ "plan_ids": ["a"] }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn unknown_status_value_is_bad_request() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(json_config())
                .route("/proposals/{id}/status", web::put().to(update_status)),
        )
        .await;

        let req = TestRequest::put()
            .uri("/proposals/3/status")
            .set_json(json!({ "status": "archived" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["status"], false);
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let start = NaiveDate::from_ymd_opt(2026, 5, 10);
        let end = NaiveDate::from_ymd_opt(2026, 5, 1);
        assert!(check_date_range(start, end).is_err());
        assert!(check_date_range(end, start).is_ok());
        assert!(check_date_range(start, None).is_ok());
    }

    #[test]
    fn mail_body_mentions_code_and_schedule() {
        let proposal = Proposal {
            id: 1,
            proposal_uid: "uid".into(),
            college_code: "C001".into(),
            proposal_code: "PR-2026-01".into(),
            issue_date: None,
            duration: None,
            start_date: NaiveDate::from_ymd_opt(2026, 6, 1),
            end_date: NaiveDate::from_ymd_opt(2026, 6, 30),
            status: "pending".into(),
            employee_id: None,
            created_at: Default::default(),
        };

        let body = proposal_mail_body(&proposal, Some("  Looking forward.  "));
        assert!(body.contains("<b>PR-2026-01</b>"));
        assert!(body.contains("2026-06-01 to 2026-06-30"));
        assert!(body.contains("<p>Looking forward.</p>"));
    }

    #[test]
    fn mail_body_escapes_markup() {
        let proposal = Proposal {
            id: 1,
            proposal_uid: "uid".into(),
            college_code: "C001".into(),
            proposal_code: "PR<1>".into(),
            issue_date: None,
            duration: None,
            start_date: None,
            end_date: None,
            status: "pending".into(),
            employee_id: None,
            created_at: Default::default(),
        };

        let body = proposal_mail_body(&proposal, Some("<script>alert('x')</script> & more"));
        assert!(body.contains("<b>PR&lt;1&gt;</b>"));
        assert!(body.contains("&lt;script&gt;alert(&apos;x&apos;)&lt;/script&gt; &amp; more"));
        assert!(!body.contains("<script>"));
    }

    #[actix_web::test]
    async fn mail_options_must_be_valid_json_when_present() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Mailer::disabled()))
                .route("/proposals/{id}/mail", web::post().to(send_proposal_mail)),
        )
        .await;

        let req = TestRequest::post()
            .uri("/proposals/3/mail")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{\"subject\": ")
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // no body: defaults apply and the request proceeds to the mailer check
        let req = TestRequest::post().uri("/proposals/3/mail").to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(resp).await["message"], "Mail relay not configured");
    }

    #[test]
    fn mail_options_parse_subject_and_message() {
        let options = parse_mail_options(br#"{"subject": "Hi", "message": "See attached"}"#).unwrap();
        assert_eq!(options.subject.as_deref(), Some("Hi"));
        assert_eq!(options.message.as_deref(), Some("See attached"));
        assert!(parse_mail_options(b"  ").unwrap().subject.is_none());
        assert!(parse_mail_options(b"[1]").is_err());
    }

    #[actix_web::test]
    async fn proposal_needs_an_existing_college_which_it_then_pins() {
        let Some(pool) = db_pool().await else { return };
        let (employee_id, _) = insert_employee(&pool, None).await;

        let app = init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .app_data(json_config())
                .route("/proposals", web::post().to(add_proposal)),
        )
        .await;

        let add = |college_code: &str, proposal_code: &str| {
            let req = TestRequest::post()
                .uri("/proposals")
                .set_json(json!({ "college_code": college_code, "proposal_code": proposal_code }))
                .to_request();
            req.extensions_mut().insert(auth_user(employee_id, 1, 1));
            req
        };

        let college_code = unique("C");
        let orphan = unique("P");
        let resp = call_service(&app, add(&college_code, &orphan)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let orphans = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM proposals WHERE proposal_code = ?")
            .bind(&orphan)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orphans, 0);

        sqlx::query("INSERT INTO colleges (code, name, location, state) VALUES (?, 'FK College', 'Pune', 'MH')")
            .bind(&college_code)
            .execute(&pool)
            .await
            .unwrap();

        let resp = call_service(&app, add(&college_code, &unique("P"))).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        assert_eq!(body["data"]["status"], "pending");
        assert_eq!(body["data"]["employee_id"], employee_id);

        // the referenced college cannot be removed underneath the proposal
        let err: ApiError = sqlx::query("DELETE FROM colleges WHERE code = ?")
            .bind(&college_code)
            .execute(&pool)
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
