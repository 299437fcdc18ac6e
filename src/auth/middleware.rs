use crate::auth::auth::authenticate;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
};
use tracing::debug;

/// Token gate for every protected scope: 401 without a bearer token,
/// 403 when the token does not verify.
pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let auth_user = match authenticate(req.request()) {
        Ok(user) => user,
        Err(e) => {
            debug!(path = %req.path(), error = %e, "Rejected request");
            let resp = e.error_response();
            return Ok(req.into_response(resp));
        }
    };

    req.extensions_mut().insert(auth_user);

    next.call(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{generate_token, tests::sample_user};
    use crate::config::Config;
    use crate::auth::auth::AuthUser;
    use actix_web::{App, HttpResponse, http::StatusCode, middleware::from_fn, test, web};

    async fn whoami(user: AuthUser) -> HttpResponse {
        HttpResponse::Ok().body(user.email)
    }

    fn app_config() -> Config {
        Config::for_tests()
    }

    #[actix_web::test]
    async fn missing_token_is_unauthorized() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_config()))
                .service(web::scope("/api").wrap(from_fn(auth_middleware)).route("/me", web::get().to(whoami))),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/me").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", "Token abc"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn invalid_token_is_forbidden() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(app_config()))
                .service(web::scope("/api").wrap(from_fn(auth_middleware)).route("/me", web::get().to(whoami))),
        )
        .await;

        let forged = generate_token(&sample_user(), "not-the-secret", 60).unwrap();
        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", format!("Bearer {forged}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn valid_token_reaches_handler_with_identity() {
        let config = app_config();
        let token = generate_token(&sample_user(), &config.jwt_secret, 60).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .service(web::scope("/api").wrap(from_fn(auth_middleware)).route("/me", web::get().to(whoami))),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert_eq!(body, "ops@example.com");
    }
}
