use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrainerStatus {
    Active,
    Inactive,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Trainer {
    pub id: u64,
    pub trainer_code: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub pan_number: Option<String>,
    pub status: String,
    pub location: Option<String>,
    pub charge: Option<f64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrainerReview {
    pub id: u64,
    pub trainer_id: u64,
    pub proposal_code: String,
    pub rating: u8,
    pub review: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Trainer allocated to a proposal.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Allocation {
    pub id: u64,
    pub trainer_id: u64,
    pub proposal_id: u64,
    pub trainer_code: String,
    pub trainer_name: String,
    pub proposal_code: String,
    pub allocated_at: NaiveDateTime,
}
