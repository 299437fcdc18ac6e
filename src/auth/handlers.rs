use crate::{
    auth::{
        auth::AuthUser,
        jwt::generate_token,
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{ApiError, require_fields},
    model::{access::Page, user::User},
    models::{SignInReq, SignUpReq},
    response,
};
use actix_web::{HttpResponse, web};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};

const USER_COLUMNS: &str =
    "id, email, password, vertical_id, position_id, employee_id, created_at";

async fn find_user_by_email(pool: &MySqlPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
        .bind(email)
        .fetch_optional(pool)
        .await
}

/// Component name of the page that gates account creation.
pub const ACCOUNTS_COMPONENT: &str = "users";

/// Resolves the page by component (404) and checks the caller's
/// (vertical, position) holds a role-access row for it (403).
pub(crate) async fn require_page_access(
    pool: &MySqlPool,
    auth: &AuthUser,
    component: &str,
) -> Result<Page, ApiError> {
    let page = sqlx::query_as::<_, Page>("SELECT id, name, component FROM pages WHERE component = ?")
        .bind(component)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Page not found"))?;

    let granted = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM role_access
        WHERE vertical_id = ? AND position_id = ? AND page_id = ?
        "#,
    )
    .bind(auth.vertical_id)
    .bind(auth.position_id)
    .bind(page.id)
    .fetch_one(pool)
    .await?;

    if granted == 0 {
        debug!(
            vertical_id = auth.vertical_id,
            position_id = auth.position_id,
            component = %component,
            "Page access denied"
        );
        return Err(ApiError::forbidden("Access denied"));
    }

    Ok(page)
}

/// Account provisioning. The caller needs the accounts page; the target
/// employee must exist and must not already own an account.
pub async fn signup(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<SignUpReq>,
) -> Result<HttpResponse, ApiError> {
    let email = payload.email.trim().to_lowercase();
    require_fields(&[("email", &email), ("password", &payload.password)])?;

    require_page_access(pool.get_ref(), &auth, ACCOUNTS_COMPONENT).await?;

    let taken = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
        .bind(&email)
        .fetch_one(pool.get_ref())
        .await?;

    if taken > 0 {
        return Err(ApiError::conflict("Email already registered"));
    }

    let employee = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees WHERE id = ?")
        .bind(payload.employee_id)
        .fetch_one(pool.get_ref())
        .await?;
    if employee == 0 {
        return Err(ApiError::bad_request("Employee does not exist"));
    }

    let linked = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE employee_id = ?")
        .bind(payload.employee_id)
        .fetch_one(pool.get_ref())
        .await?;
    if linked > 0 {
        return Err(ApiError::conflict("Employee already has an account"));
    }

    let hashed = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        ApiError::internal(e.to_string())
    })?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (email, password, vertical_id, position_id, employee_id)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&email)
    .bind(&hashed)
    .bind(payload.vertical_id)
    .bind(payload.position_id)
    .bind(payload.employee_id)
    .execute(pool.get_ref())
    .await?;

    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(result.last_insert_id())
        .fetch_one(pool.get_ref())
        .await?;

    info!(user_id = user.id, created_by = auth.user_id, "User registered");

    // password hash is never serialized
    Ok(response::created("User registered successfully", user))
}

#[instrument(
    name = "auth_signin",
    skip(pool, config, payload),
    fields(email = %payload.email)
)]
pub async fn signin(
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<SignInReq>,
) -> Result<HttpResponse, ApiError> {
    info!("Sign-in request received");

    let email = payload.email.trim().to_lowercase();
    require_fields(&[("email", &email), ("password", &payload.password)])?;

    debug!("Fetching user from database");

    let user = match find_user_by_email(pool.get_ref(), &email).await? {
        Some(user) => user,
        None => {
            info!("Invalid credentials: user not found");
            return Err(ApiError::Unauthorized("Invalid credentials".into()));
        }
    };

    if let Err(e) = verify_password(&payload.password, &user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    }

    let token = generate_token(&user, &config.jwt_secret, config.access_token_ttl).map_err(|e| {
        error!(error = %e, "Failed to sign token");
        ApiError::internal(e.to_string())
    })?;

    info!(user_id = user.id, "Sign-in successful");

    Ok(response::ok(
        "Signed in successfully",
        json!({ "token": token, "user": user }),
    ))
}

pub async fn me(auth: AuthUser) -> HttpResponse {
    response::ok("Authenticated user", auth)
}

/// Looks the page up by component name, then checks the caller's
/// (vertical, position) has a role-access row for it.
#[utoipa::path(
    get,
    path = "/api/auth/access/{component}",
    params(
        ("component" = String, Path, description = "Front-end component name of the page")
    ),
    responses(
        (status = 200, description = "Access granted"),
        (status = 403, description = "Role has no access to the page"),
        (status = 404, description = "Page not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn check_access(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let page = require_page_access(pool.get_ref(), &auth, &path.into_inner()).await?;
    Ok(response::ok("Access granted", page))
}

/// Pages visible to the caller's role.
pub async fn my_pages(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, ApiError> {
    let pages = sqlx::query_as::<_, Page>(
        r#"
        SELECT p.id, p.name, p.component
        FROM pages p
        JOIN role_access ra ON ra.page_id = p.id
        WHERE ra.vertical_id = ? AND ra.position_id = ?
        ORDER BY p.name
        "#,
    )
    .bind(auth.vertical_id)
    .bind(auth.position_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(response::ok("Pages fetched successfully", pages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::json_config;
    use crate::test_utils::{
        auth_user, db_pool, insert_employee, insert_named, json_body, lazy_pool, unique,
    };
    use actix_web::test::{TestRequest, call_service, init_service};
    use actix_web::{App, HttpMessage, ResponseError, http::StatusCode};

    async fn page_id(pool: &MySqlPool, component: &str) -> u64 {
        sqlx::query("INSERT IGNORE INTO pages (name, component) VALUES (?, ?)")
            .bind(component)
            .bind(component)
            .execute(pool)
            .await
            .unwrap();
        sqlx::query_scalar::<_, u64>("SELECT id FROM pages WHERE component = ?")
            .bind(component)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn grant(pool: &MySqlPool, vertical_id: u64, position_id: u64, page_id: u64) {
        sqlx::query("INSERT INTO role_access (vertical_id, position_id, page_id) VALUES (?, ?, ?)")
            .bind(vertical_id)
            .bind(position_id)
            .bind(page_id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[actix_web::test]
    async fn signin_rejects_blank_credentials() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .app_data(json_config())
                .route("/signin", web::post().to(signin)),
        )
        .await;

        let req = TestRequest::post()
            .uri("/signin")
            .set_json(json!({ "email": " ", "password": "" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await["message"],
            "Missing required fields: email, password"
        );
    }

    #[actix_web::test]
    async fn page_access_needs_both_page_and_grant() {
        let Some(pool) = db_pool().await else { return };
        let vertical_id = insert_named(&pool, "verticals").await;
        let position_id = insert_named(&pool, "positions").await;
        let auth = auth_user(1, vertical_id, position_id);

        let err = check_access(auth.clone(), web::Data::new(pool.clone()), web::Path::from(unique("none")))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let component = unique("page");
        let page = page_id(&pool, &component).await;
        let err = check_access(auth.clone(), web::Data::new(pool.clone()), web::Path::from(component.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        grant(&pool, vertical_id, position_id, page).await;
        let resp = check_access(auth, web::Data::new(pool.clone()), web::Path::from(component))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn account_creation_guards_role_and_employee() {
        let Some(pool) = db_pool().await else { return };
        let vertical_id = insert_named(&pool, "verticals").await;
        let position_id = insert_named(&pool, "positions").await;
        let (caller_employee, _) = insert_employee(&pool, None).await;
        let caller = auth_user(caller_employee, vertical_id, position_id);

        let app = init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .app_data(json_config())
                .route("/signup", web::post().to(signup)),
        )
        .await;

        let signup_req = |employee_id: u64, email: &str| {
            let req = TestRequest::post()
                .uri("/signup")
                .set_json(json!({
                    "email": email,
                    "password": "s3cret!",
                    "vertical_id": vertical_id,
                    "position_id": position_id,
                    "employee_id": employee_id
                }))
                .to_request();
            req.extensions_mut().insert(caller.clone());
            req
        };

        let (target, target_email) = insert_employee(&pool, None).await;

        // role without the accounts page
        let accounts = page_id(&pool, ACCOUNTS_COMPONENT).await;
        let resp = call_service(&app, signup_req(target, &target_email)).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        grant(&pool, vertical_id, position_id, accounts).await;

        let resp = call_service(&app, signup_req(u64::MAX, &format!("x{target_email}"))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = call_service(&app, signup_req(target, &target_email)).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json_body(resp).await;
        assert_eq!(body["data"]["employee_id"], target);
        assert!(body["data"].get("password").is_none());

        // the employee already owns an account
        let resp = call_service(&app, signup_req(target, &format!("other.{target_email}"))).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE employee_id = ?")
            .bind(target)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(users, 1);
    }
}
