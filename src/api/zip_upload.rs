use std::io::Cursor;

use crate::{
    config::Config,
    error::ApiError,
    response,
    utils::pan::{EMAIL_NOT_FOUND, PAN_NOT_FOUND, base_name, extract_pan},
};
use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures::future::join_all;
use futures_util::StreamExt;
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::{debug, error, info};
use zip::{ZipArchive, result::ZipError};

/// One row of the ingestion report, in archive order.
#[derive(Debug, Serialize, PartialEq)]
pub struct PanRecord {
    pub file_name: String,
    pub pan: String,
    pub email: String,
}

/// Names of the file entries of a zip archive; directories are skipped.
fn archive_entries(bytes: &[u8]) -> Result<Vec<String>, ZipError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut names = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        if entry.is_dir() {
            continue;
        }
        names.push(entry.name().to_string());
    }
    Ok(names)
}

/// Email of the employee or trainer holding `pan`.
async fn lookup_email(pool: &MySqlPool, pan: &str) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT email FROM employees WHERE pan_number = ?
        UNION
        SELECT email FROM trainers WHERE pan_number = ?
        LIMIT 1
        "#,
    )
    .bind(pan)
    .bind(pan)
    .fetch_optional(pool)
    .await
}

async fn resolve_entry(pool: &MySqlPool, entry: String) -> Result<PanRecord, sqlx::Error> {
    let file_name = base_name(&entry).to_string();

    let Some(pan) = extract_pan(&entry).map(str::to_string) else {
        return Ok(PanRecord {
            file_name,
            pan: PAN_NOT_FOUND.to_string(),
            email: EMAIL_NOT_FOUND.to_string(),
        });
    };

    let email = lookup_email(pool, &pan)
        .await?
        .unwrap_or_else(|| EMAIL_NOT_FOUND.to_string());

    Ok(PanRecord {
        file_name,
        pan,
        email,
    })
}

/// Resolves every entry concurrently; the report keeps archive order.
async fn resolve_entries(pool: &MySqlPool, entries: Vec<String>) -> Result<Vec<PanRecord>, sqlx::Error> {
    join_all(entries.into_iter().map(|entry| resolve_entry(pool, entry)))
        .await
        .into_iter()
        .collect()
}

/// Reads the `file` part of the upload, enforcing the size limit while the
/// body streams in.
async fn read_archive_field(payload: &mut Multipart, limit: usize) -> Result<Vec<u8>, ApiError> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ApiError::bad_request(e.to_string()))?;
        if field.name() != "file" {
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ApiError::bad_request(e.to_string()))?;
            if bytes.len() + chunk.len() > limit {
                return Err(ApiError::bad_request(format!(
                    "Archive exceeds the upload limit of {limit} bytes"
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        return Ok(bytes);
    }

    Err(ApiError::bad_request("Missing multipart field 'file'"))
}

/// Maps every file in an uploaded zip to the PAN in its name and the email of
/// the matching employee or trainer.
pub async fn upload_zip(
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let bytes = read_archive_field(&mut payload, config.upload_max_bytes).await?;
    let size = bytes.len();

    let entries = web::block(move || archive_entries(&bytes))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .map_err(|e| {
            error!(error = %e, size, "Failed to read uploaded archive");
            ApiError::internal(format!("Failed to read archive: {e}"))
        })?;

    debug!(entries = entries.len(), size, "Archive parsed");

    let records = resolve_entries(pool.get_ref(), entries).await?;

    let matched = records.iter().filter(|r| r.email != EMAIL_NOT_FOUND).count();
    info!(files = records.len(), matched, "Archive processed");

    Ok(response::ok("Archive processed successfully", records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{db_pool, insert_employee, json_body, lazy_pool, unique, unique_pan};
    use actix_web::{App, http::StatusCode, http::header};
    use actix_web::test::{TestRequest, call_service, init_service};
    use std::io::Write;
    use zip::{ZipWriter, write::FileOptions};

    const BOUNDARY: &str = "----crm-test-boundary";

    fn archive(names: &[&str]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for name in names {
            if name.ends_with('/') {
                writer.add_directory(*name, FileOptions::default()).unwrap();
            } else {
                writer.start_file(*name, FileOptions::default()).unwrap();
                writer.write_all(b"%PDF-1.4").unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    fn multipart_body(field: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"slips.zip\"\r\n\
             Content-Type: application/zip\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(field: &str, bytes: &[u8]) -> TestRequest {
        TestRequest::post()
            .uri("/zip/upload")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(multipart_body(field, bytes))
    }

    fn app_config(limit: usize) -> Config {
        let mut config = Config::for_tests();
        config.upload_max_bytes = limit;
        config
    }

    macro_rules! app {
        ($limit:expr) => {
            init_service(
                App::new()
                    .app_data(web::Data::new(lazy_pool()))
                    .app_data(web::Data::new(app_config($limit)))
                    .route("/zip/upload", web::post().to(upload_zip)),
            )
            .await
        };
    }

    #[test]
    fn directories_are_skipped_and_order_kept() {
        let bytes = archive(&["march/", "march/ABCDE1234F_slip.pdf", "notes.txt"]);
        assert_eq!(
            archive_entries(&bytes).unwrap(),
            vec!["march/ABCDE1234F_slip.pdf", "notes.txt"]
        );
        assert!(archive_entries(b"definitely not a zip").is_err());
    }

    #[actix_web::test]
    async fn names_without_pan_never_query() {
        let records = resolve_entries(&lazy_pool(), vec!["readme.txt".into(), "x/slip.pdf".into()])
            .await
            .unwrap();
        assert_eq!(
            records,
            vec![
                PanRecord {
                    file_name: "readme.txt".into(),
                    pan: PAN_NOT_FOUND.into(),
                    email: EMAIL_NOT_FOUND.into(),
                },
                PanRecord {
                    file_name: "slip.pdf".into(),
                    pan: PAN_NOT_FOUND.into(),
                    email: EMAIL_NOT_FOUND.into(),
                },
            ]
        );
    }

    #[actix_web::test]
    async fn upload_reports_every_file() {
        let app = app!(1024 * 1024);
        let bytes = archive(&["docs/", "invoice-2026.pdf"]);

        let resp = call_service(&app, upload("file", &bytes).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(resp).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["file_name"], "invoice-2026.pdf");
        assert_eq!(body["data"][0]["pan"], "Not Found");
        assert_eq!(body["data"][0]["email"], "Email Not Found");
    }

    #[actix_web::test]
    async fn oversized_upload_is_bad_request() {
        let app = app!(16);
        let bytes = archive(&["a.pdf", "b.pdf"]);

        let resp = call_service(&app, upload("file", &bytes).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn missing_file_field_is_bad_request() {
        let app = app!(1024);
        let resp = call_service(&app, upload("attachment", b"zip").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["message"], "Missing multipart field 'file'");
    }

    #[actix_web::test]
    async fn corrupt_archive_is_internal_error() {
        let app = app!(1024);
        let resp = call_service(&app, upload("file", b"not a zip at all").to_request()).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn pans_resolve_across_employees_and_trainers() {
        let Some(pool) = db_pool().await else { return };

        let employee_pan = unique_pan();
        let (_, employee_email) = insert_employee(&pool, Some(&employee_pan)).await;

        let trainer_pan = unique_pan();
        let trainer_code = unique("T");
        let trainer_email = format!("{}@trainers.example.com", trainer_code.to_lowercase());
        sqlx::query("INSERT INTO trainers (trainer_code, name, email, pan_number) VALUES (?, 'Test Trainer', ?, ?)")
            .bind(&trainer_code)
            .bind(&trainer_email)
            .bind(&trainer_pan)
            .execute(&pool)
            .await
            .unwrap();

        let unknown_pan = unique_pan();
        let names = [
            format!("{trainer_pan}_invoice.pdf"),
            "readme.txt".to_string(),
            format!("slips/{employee_pan}-march.pdf"),
            format!("{unknown_pan} slip.pdf"),
        ];
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let bytes = archive(&refs);

        let app = init_service(
            App::new()
                .app_data(web::Data::new(pool.clone()))
                .app_data(web::Data::new(app_config(1024 * 1024)))
                .route("/zip/upload", web::post().to(upload_zip)),
        )
        .await;

        let resp = call_service(&app, upload("file", &bytes).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        let records = body["data"].as_array().unwrap();

        let rows: Vec<(&str, &str, &str)> = records
            .iter()
            .map(|r| {
                (
                    r["file_name"].as_str().unwrap(),
                    r["pan"].as_str().unwrap(),
                    r["email"].as_str().unwrap(),
                )
            })
            .collect();

        let employee_file = format!("{employee_pan}-march.pdf");
        let unknown_file = format!("{unknown_pan} slip.pdf");
        assert_eq!(
            rows,
            vec![
                (names[0].as_str(), trainer_pan.as_str(), trainer_email.as_str()),
                ("readme.txt", PAN_NOT_FOUND, EMAIL_NOT_FOUND),
                (employee_file.as_str(), employee_pan.as_str(), employee_email.as_str()),
                (unknown_file.as_str(), unknown_pan.as_str(), EMAIL_NOT_FOUND),
            ]
        );
    }
}
