use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "code": "C001",
        "name": "Government Engineering College",
        "location": "Pune",
        "state": "Maharashtra",
        "created_at": "2026-01-01T10:00:00"
    })
)]
pub struct College {
    pub id: u64,
    pub code: String,
    pub name: String,
    pub location: String,
    pub state: String,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

/// Point of contact at a college.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Poc {
    pub id: u64,
    pub college_id: u64,
    pub name: String,
    pub designation: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}
