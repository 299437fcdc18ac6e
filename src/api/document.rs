use std::path::PathBuf;
use std::str::FromStr;

use crate::{
    config::Config,
    error::ApiError,
    utils::{
        db_utils::into_object,
        template::{TemplateError, render_docx, scalar_text},
    },
};
use actix_web::{
    HttpResponse,
    http::header::{ContentDisposition, DispositionParam, DispositionType},
    web,
};
use chrono::Local;
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};
use tracing::{error, info};

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Templates that can be rendered; each maps to `{TEMPLATES_DIR}/{kind}.docx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DocumentKind {
    Payslip,
    Invoice,
    Agreement,
    Terms,
}

impl DocumentKind {
    fn template_path(self, templates_dir: &str) -> PathBuf {
        PathBuf::from(templates_dir).join(format!("{self}.docx"))
    }
}

/// Renders the named template with the request body as merge values and
/// returns the document as an attachment.
pub async fn generate_document(
    config: web::Data<Config>,
    path: web::Path<String>,
    body: web::Json<Value>,
) -> Result<HttpResponse, ApiError> {
    let kind = DocumentKind::from_str(&path.into_inner())
        .map_err(|_| ApiError::not_found("Unknown document kind"))?;

    let values = into_object(body.into_inner())?;
    if let Some((key, _)) = values.iter().find(|(_, v)| scalar_text(v).is_none()) {
        return Err(ApiError::bad_request(format!("Field '{key}' must be a scalar value")));
    }

    let template = kind.template_path(&config.templates_dir);

    let rendered = web::block(move || -> Result<Vec<u8>, TemplateError> {
        let bytes = std::fs::read(&template)?;
        render_docx(&bytes, &values)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?
    .map_err(|e| {
        error!(error = %e, %kind, "Document generation failed");
        ApiError::internal(e.to_string())
    })?;

    let file_name = format!("{kind}_{}.docx", Local::now().format("%Y%m%d%H%M%S"));
    info!(%kind, bytes = rendered.len(), file = %file_name, "Document generated");

    Ok(HttpResponse::Ok()
        .content_type(DOCX_MIME)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(file_name)],
        })
        .body(rendered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::json_config;
    use crate::test_utils::json_body;
    use crate::utils::template::tests::sample_docx;
    use actix_web::{App, http::StatusCode, http::header};
    use actix_web::test::{TestRequest, call_service, init_service, read_body};
    use serde_json::json;
    use std::io::{Cursor, Read};

    const BODY: &str =
        "<w:document><w:body><w:p><w:r><w:t>Pay for {name}: {amount}</w:t></w:r></w:p></w:body></w:document>";

    fn config_for(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::for_tests();
        config.templates_dir = dir.path().to_string_lossy().into_owned();
        config
    }

    macro_rules! app {
        ($config:expr) => {
            init_service(
                App::new()
                    .app_data(web::Data::new($config))
                    .app_data(json_config())
                    .route("/documents/{kind}", web::post().to(generate_document)),
            )
            .await
        };
    }

    #[test]
    fn kinds_parse_from_lowercase_path_segment() {
        assert_eq!(DocumentKind::from_str("payslip").unwrap(), DocumentKind::Payslip);
        assert!(DocumentKind::from_str("resume").is_err());
        assert!(
            DocumentKind::Terms
                .template_path("/srv/templates")
                .ends_with("terms.docx")
        );
    }

    #[actix_web::test]
    async fn payslip_is_rendered_as_attachment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("payslip.docx"), sample_docx(BODY)).unwrap();
        let app = app!(config_for(&dir));

        let req = TestRequest::post()
            .uri("/documents/payslip")
            .set_json(json!({ "name": "Asha", "amount": 52000, "company": "Acme" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), DOCX_MIME);
        let disposition = resp.headers().get(header::CONTENT_DISPOSITION).unwrap();
        assert!(disposition.to_str().unwrap().starts_with("attachment"));

        let bytes = read_body(resp).await;
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        assert!(xml.contains("Pay for Asha: 52000"));
    }

    #[actix_web::test]
    async fn unknown_kind_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(config_for(&dir));

        let req = TestRequest::post()
            .uri("/documents/resume")
            .set_json(json!({}))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn missing_merge_value_or_template_is_internal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("invoice.docx"), sample_docx(BODY)).unwrap();
        let app = app!(config_for(&dir));

        let req = TestRequest::post()
            .uri("/documents/invoice")
            .set_json(json!({ "name": "Asha", "company": "Acme" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(resp).await["message"],
            "No value provided for merge tag 'amount'"
        );

        // no agreement.docx in the directory
        let req = TestRequest::post()
            .uri("/documents/agreement")
            .set_json(json!({ "name": "Asha" }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn nested_values_are_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let app = app!(config_for(&dir));

        let req = TestRequest::post()
            .uri("/documents/terms")
            .set_json(json!({ "items": [1, 2] }))
            .to_request();
        let resp = call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["message"], "Field 'items' must be a scalar value");
    }
}
