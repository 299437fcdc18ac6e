use crate::{
    auth::auth::AuthUser,
    error::{ApiError, require_fields},
    response,
    utils::mailer::Mailer,
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Deserialize)]
pub struct SendMail {
    pub to: String,
    pub subject: String,
    /// HTML body
    pub body: String,
}

/// Queues one message; delivery happens in the background.
pub async fn send_mail(
    auth: AuthUser,
    mailer: web::Data<Mailer>,
    payload: web::Json<SendMail>,
) -> Result<HttpResponse, ApiError> {
    require_fields(&[
        ("to", &payload.to),
        ("subject", &payload.subject),
        ("body", &payload.body),
    ])?;

    let SendMail { to, subject, body } = payload.into_inner();
    mailer.send_in_background(&to, subject.trim(), body)?;

    info!(sender = %auth.email, to = %to.trim(), "Mail queued");

    Ok(response::accepted("Mail queued for delivery", json!({ "to": to.trim() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::json_config;
    use crate::test_utils::json_body;
    use actix_web::{App, HttpMessage, http::StatusCode, test};

    fn caller() -> AuthUser {
        AuthUser {
            user_id: 1,
            email: "ops@example.com".into(),
            vertical_id: 1,
            position_id: 1,
            employee_id: 1,
        }
    }

    #[actix_web::test]
    async fn disabled_relay_is_reported() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(Mailer::disabled()))
                .app_data(json_config())
                .route("/mail/send", web::post().to(send_mail)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/mail/send")
            .set_json(json!({ "to": "a@example.com", "subject": "Hi", "body": "<p>x</p>" }))
            .to_request();
        req.extensions_mut().insert(caller());
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(resp).await["message"], "Mail relay not configured");
    }

    #[actix_web::test]
    async fn blank_subject_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(Mailer::disabled()))
                .app_data(json_config())
                .route("/mail/send", web::post().to(send_mail)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/mail/send")
            .set_json(json!({ "to": "a@example.com", "subject": "", "body": "<p>x</p>" }))
            .to_request();
        req.extensions_mut().insert(caller());
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
