use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: u64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub vertical_id: u64,
    pub position_id: u64,
    pub employee_id: u64,
    pub created_at: NaiveDateTime,
}
