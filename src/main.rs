use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod response;
mod routes;
mod utils;

#[cfg(test)]
mod test_utils;

use config::Config;
use db::{init_db, run_setup};

use crate::docs::ApiDoc;
use crate::utils::mailer::Mailer;
use tracing::{info, warn};
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "CRM API is running"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!("Server starting...");

    let pool = init_db(&config).await?;

    if std::env::args().any(|arg| arg == "--setup") {
        run_setup(&pool, &config).await?;
        info!("Setup finished");
        return Ok(());
    }

    let mailer = Mailer::from_config(config.smtp.as_ref())?;
    if !mailer.is_enabled() {
        warn!("SMTP_HOST not set; mail endpoints will refuse to send");
    }

    let server_addr = config.server_addr.clone();
    let openapi = ApiDoc::openapi();

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                // wildcard {_:.*} so the UI's JS/CSS assets resolve
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-doc/openapi.json", openapi.clone()),
            )
            .app_data(Data::new(pool.clone()))
            .app_data(Data::new(config.clone()))
            .app_data(Data::new(mailer.clone()))
            .app_data(error::json_config())
            .app_data(error::path_config())
            .app_data(error::query_config())
            .service(index)
            .configure(|cfg| routes::configure(cfg, config.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
