use actix_web::HttpResponse;
use serde::Serialize;

/// `{status, message, data}` envelope returned by every JSON handler.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: bool,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            status: true,
            message: message.into(),
            data,
        }
    }
}

pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::new(message, data))
}

pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> HttpResponse {
    HttpResponse::Created().json(ApiResponse::new(message, data))
}

pub fn accepted<T: Serialize>(message: impl Into<String>, data: T) -> HttpResponse {
    HttpResponse::Accepted().json(ApiResponse::new(message, data))
}

/// Success without a payload (`data: null`).
pub fn message(message: impl Into<String>) -> HttpResponse {
    ok(message, serde_json::Value::Null)
}
