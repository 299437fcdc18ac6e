use crate::{config::Config, error::ApiError, models::Claims};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};
use serde::Serialize;

use super::jwt::verify_token;

/// Identity attached to every request that passed the token gate.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub vertical_id: u64,
    pub position_id: u64,
    pub employee_id: u64,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.sub,
            vertical_id: claims.vertical_id,
            position_id: claims.position_id,
            employee_id: claims.employee_id,
        }
    }
}

/// Pulls the bearer token out of the `Authorization` header.
/// A missing or malformed header is 401; verification happens elsewhere.
pub fn bearer_token(req: &HttpRequest) -> Result<&str, ApiError> {
    let header = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

    header
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid Authorization header encoding".into()))?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("Authorization header must start with Bearer".into()))
}

/// Verifies the request token; an invalid or expired token is 403.
pub fn authenticate(req: &HttpRequest) -> Result<AuthUser, ApiError> {
    let token = bearer_token(req)?;

    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| ApiError::internal("App config missing"))?;

    verify_token(token, &config.jwt_secret)
        .map(AuthUser::from)
        .map_err(|e| ApiError::forbidden(format!("Invalid or expired token: {e}")))
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // set by auth_middleware on protected scopes
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        ready(authenticate(req).map_err(actix_web::Error::from))
    }
}
