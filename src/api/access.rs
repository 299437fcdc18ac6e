use crate::{
    error::{ApiError, require_fields},
    model::access::{Page, Position, RoleAccess, Vertical},
    response,
    utils::db_utils::count_existing,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;

#[derive(Deserialize)]
pub struct NameReq {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreatePage {
    pub name: String,
    pub component: String,
}

#[derive(Deserialize)]
pub struct GrantAccess {
    pub vertical_id: u64,
    pub position_id: u64,
    pub page_id: u64,
}

#[derive(Deserialize)]
pub struct RoleAccessQuery {
    pub vertical_id: Option<u64>,
    pub position_id: Option<u64>,
}

/* =========================
Verticals & positions
========================= */

/// Shared insert for the two single-name lookup tables.
async fn add_named(pool: &MySqlPool, table: &str, name: &str) -> Result<u64, ApiError> {
    require_fields(&[("name", name)])?;

    let exists = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table} WHERE name = ?"))
        .bind(name.trim())
        .fetch_one(pool)
        .await?;
    if exists > 0 {
        return Err(ApiError::conflict(format!("'{}' already exists", name.trim())));
    }

    let result = sqlx::query(&format!("INSERT INTO {table} (name) VALUES (?)"))
        .bind(name.trim())
        .execute(pool)
        .await?;

    Ok(result.last_insert_id())
}

async fn delete_by_id(pool: &MySqlPool, table: &str, id: u64) -> Result<bool, ApiError> {
    let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = ?"))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn add_vertical(
    pool: web::Data<MySqlPool>,
    payload: web::Json<NameReq>,
) -> Result<HttpResponse, ApiError> {
    let id = add_named(pool.get_ref(), "verticals", &payload.name).await?;
    Ok(response::created(
        "Vertical added successfully",
        Vertical {
            id,
            name: payload.name.trim().to_string(),
        },
    ))
}

pub async fn list_verticals(pool: web::Data<MySqlPool>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, Vertical>("SELECT id, name FROM verticals ORDER BY name")
        .fetch_all(pool.get_ref())
        .await?;
    Ok(response::ok("Verticals fetched successfully", rows))
}

pub async fn delete_vertical(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    if !delete_by_id(pool.get_ref(), "verticals", path.into_inner()).await? {
        return Err(ApiError::not_found("Vertical not found"));
    }
    Ok(response::message("Vertical deleted successfully"))
}

pub async fn add_position(
    pool: web::Data<MySqlPool>,
    payload: web::Json<NameReq>,
) -> Result<HttpResponse, ApiError> {
    let id = add_named(pool.get_ref(), "positions", &payload.name).await?;
    Ok(response::created(
        "Position added successfully",
        Position {
            id,
            name: payload.name.trim().to_string(),
        },
    ))
}

pub async fn list_positions(pool: web::Data<MySqlPool>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, Position>("SELECT id, name FROM positions ORDER BY name")
        .fetch_all(pool.get_ref())
        .await?;
    Ok(response::ok("Positions fetched successfully", rows))
}

pub async fn delete_position(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    if !delete_by_id(pool.get_ref(), "positions", path.into_inner()).await? {
        return Err(ApiError::not_found("Position not found"));
    }
    Ok(response::message("Position deleted successfully"))
}

/* =========================
Pages
========================= */

pub async fn add_page(
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreatePage>,
) -> Result<HttpResponse, ApiError> {
    require_fields(&[("name", &payload.name), ("component", &payload.component)])?;
    let component = payload.component.trim();

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pages WHERE component = ?")
        .bind(component)
        .fetch_one(pool.get_ref())
        .await?;
    if exists > 0 {
        return Err(ApiError::conflict("Page component already exists"));
    }

    let result = sqlx::query("INSERT INTO pages (name, component) VALUES (?, ?)")
        .bind(payload.name.trim())
        .bind(component)
        .execute(pool.get_ref())
        .await?;

    Ok(response::created(
        "Page added successfully",
        Page {
            id: result.last_insert_id(),
            name: payload.name.trim().to_string(),
            component: component.to_string(),
        },
    ))
}

pub async fn list_pages(pool: web::Data<MySqlPool>) -> Result<HttpResponse, ApiError> {
    let rows = sqlx::query_as::<_, Page>("SELECT id, name, component FROM pages ORDER BY name")
        .fetch_all(pool.get_ref())
        .await?;
    Ok(response::ok("Pages fetched successfully", rows))
}

pub async fn delete_page(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    if !delete_by_id(pool.get_ref(), "pages", path.into_inner()).await? {
        return Err(ApiError::not_found("Page not found"));
    }
    Ok(response::message("Page deleted successfully"))
}

/* =========================
Role access
========================= */

const ROLE_ACCESS_SELECT: &str = r#"
    SELECT ra.id, ra.vertical_id, ra.position_id, ra.page_id,
           v.name AS vertical, p.name AS position, pg.component
    FROM role_access ra
    JOIN verticals v ON v.id = ra.vertical_id
    JOIN positions p ON p.id = ra.position_id
    JOIN pages pg ON pg.id = ra.page_id
"#;

pub async fn grant_access(
    pool: web::Data<MySqlPool>,
    payload: web::Json<GrantAccess>,
) -> Result<HttpResponse, ApiError> {
    let pool = pool.get_ref();

    for (table, id, label) in [
        ("verticals", payload.vertical_id, "Vertical"),
        ("positions", payload.position_id, "Position"),
        ("pages", payload.page_id, "Page"),
    ] {
        if count_existing(pool, table, &[id]).await? == 0 {
            return Err(ApiError::not_found(format!("{label} not found")));
        }
    }

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM role_access WHERE vertical_id = ? AND position_id = ? AND page_id = ?",
    )
    .bind(payload.vertical_id)
    .bind(payload.position_id)
    .bind(payload.page_id)
    .fetch_one(pool)
    .await?;
    if exists > 0 {
        return Err(ApiError::conflict("Access already granted"));
    }

    let result = sqlx::query(
        "INSERT INTO role_access (vertical_id, position_id, page_id) VALUES (?, ?, ?)",
    )
    .bind(payload.vertical_id)
    .bind(payload.position_id)
    .bind(payload.page_id)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, RoleAccess>(&format!("{ROLE_ACCESS_SELECT} WHERE ra.id = ?"))
        .bind(result.last_insert_id())
        .fetch_one(pool)
        .await?;

    info!(
        vertical_id = row.vertical_id,
        position_id = row.position_id,
        component = %row.component,
        "Role access granted"
    );

    Ok(response::created("Access granted successfully", row))
}

pub async fn list_access(
    pool: web::Data<MySqlPool>,
    query: web::Query<RoleAccessQuery>,
) -> Result<HttpResponse, ApiError> {
    let mut sql = format!("{ROLE_ACCESS_SELECT} WHERE 1=1");
    let mut args = Vec::new();

    if let Some(vertical_id) = query.vertical_id {
        sql.push_str(" AND ra.vertical_id = ?");
        args.push(vertical_id);
    }
    if let Some(position_id) = query.position_id {
        sql.push_str(" AND ra.position_id = ?");
        args.push(position_id);
    }
    sql.push_str(" ORDER BY v.name, p.name, pg.component");

    let mut q = sqlx::query_as::<_, RoleAccess>(&sql);
    for arg in args {
        q = q.bind(arg);
    }

    let rows = q.fetch_all(pool.get_ref()).await?;
    Ok(response::ok("Role access fetched successfully", rows))
}

pub async fn revoke_access(
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, ApiError> {
    if !delete_by_id(pool.get_ref(), "role_access", path.into_inner()).await? {
        return Err(ApiError::not_found("Role access not found"));
    }
    Ok(response::message("Access revoked successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::json_config;
    use crate::test_utils::{db_pool, insert_named, json_body, lazy_pool, unique};
    use actix_web::test::{TestRequest, call_service, init_service};
    use actix_web::{App, http::StatusCode};
    use serde_json::json;

    #[actix_web::test]
    async fn blank_names_are_rejected() {
        let app = init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(json_config())
                .route("/verticals", web::post().to(add_vertical))
                .route("/pages", web::post().to(add_page)),
        )
        .await;

        let req = TestRequest::post()
            .uri("/verticals")
            .set_json(json!({ "name": "  " }))
            .to_request();
        assert_eq!(call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = TestRequest::post()
            .uri("/pages")
            .set_json(json!({ "name": "Colleges", "component": "" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["message"], "Missing required fields: component");
    }

    #[actix_web::test]
    async fn duplicate_vertical_is_conflict_without_a_second_row() {
        let Some(pool) = db_pool().await else { return };
        let app = init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .app_data(json_config())
                .route("/verticals", web::post().to(add_vertical)),
        )
        .await;

        let name = unique("Sales");
        for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
            let req = TestRequest::post()
                .uri("/verticals")
                .set_json(json!({ "name": name }))
                .to_request();
            assert_eq!(call_service(&app, req).await.status(), expected);
        }

        let rows = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM verticals WHERE name = ?")
            .bind(&name)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[actix_web::test]
    async fn grant_validates_ids_and_refuses_duplicates() {
        let Some(pool) = db_pool().await else { return };
        let vertical_id = insert_named(&pool, "verticals").await;
        let position_id = insert_named(&pool, "positions").await;
        let component = unique("cmp");
        let page_id = sqlx::query("INSERT INTO pages (name, component) VALUES ('Test page', ?)")
            .bind(&component)
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_id();

        let app = init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .app_data(json_config())
                .route("/roles", web::post().to(grant_access)),
        )
        .await;

        let grant = |page_id: u64| {
            TestRequest::post()
                .uri("/roles")
                .set_json(json!({
                    "vertical_id": vertical_id,
                    "position_id": position_id,
                    "page_id": page_id
                }))
                .to_request()
        };

        let resp = call_service(&app, grant(u64::MAX)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(resp).await["message"], "Page not found");

        let resp = call_service(&app, grant(page_id)).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(json_body(resp).await["data"]["component"], component.as_str());

        let resp = call_service(&app, grant(page_id)).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
