use anyhow::{Context, Result, anyhow};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use tracing::info;

use crate::auth::{handlers::ACCOUNTS_COMPONENT, password::hash_password};
use crate::config::Config;

const SCHEMA: &str = include_str!("../sql/schema.sql");

pub async fn init_db(config: &Config) -> Result<MySqlPool> {
    MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")
}

/// Splits the embedded schema script into executable statements.
fn schema_statements(script: &str) -> Vec<String> {
    let without_comments = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(str::to_string)
        .collect()
}

fn admin_password_hash(config: &Config) -> Result<String> {
    let admin_password = config
        .admin_password
        .as_deref()
        .context("ADMIN_PASSWORD must be set for --setup")?;

    hash_password(admin_password).map_err(|e| anyhow!("Failed to hash admin password: {e}"))
}

/// Runs every `CREATE TABLE IF NOT EXISTS` of the embedded schema.
pub async fn create_schema(pool: &MySqlPool) -> Result<usize> {
    let statements = schema_statements(SCHEMA);
    for stmt in &statements {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to run schema statement: {stmt}"))?;
    }
    Ok(statements.len())
}

/// One-shot setup: creates every table and seeds the administrative
/// vertical, position, employee and user, plus the account-management page
/// granted to that role.
pub async fn run_setup(pool: &MySqlPool, config: &Config) -> Result<()> {
    let statements = create_schema(pool).await?;
    info!(statements, "Schema created");

    let hashed = admin_password_hash(config)?;

    let mut tx = pool.begin().await?;

    sqlx::query("INSERT IGNORE INTO verticals (name) VALUES ('Administration')")
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT IGNORE INTO positions (name) VALUES ('Admin')")
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        r#"
        INSERT IGNORE INTO employees (employee_code, name, email, designation)
        VALUES ('EMP000', 'Administrator', ?, 'Administrator')
        "#,
    )
    .bind(&config.admin_email)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT IGNORE INTO users (email, password, vertical_id, position_id, employee_id)
        SELECT ?, ?, v.id, p.id, e.id
        FROM verticals v, positions p, employees e
        WHERE v.name = 'Administration' AND p.name = 'Admin' AND e.employee_code = 'EMP000'
        "#,
    )
    .bind(&config.admin_email)
    .bind(&hashed)
    .execute(&mut *tx)
    .await?;

    sqlx::query("INSERT IGNORE INTO pages (name, component) VALUES ('User Accounts', ?)")
        .bind(ACCOUNTS_COMPONENT)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        r#"
        INSERT IGNORE INTO role_access (vertical_id, position_id, page_id)
        SELECT v.id, p.id, pg.id
        FROM verticals v, positions p, pages pg
        WHERE v.name = 'Administration' AND p.name = 'Admin' AND pg.component = ?
        "#,
    )
    .bind(ACCOUNTS_COMPONENT)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(email = %config.admin_email, "Administrative user seeded");
    Ok(())
}
