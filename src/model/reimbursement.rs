use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReimbursementStatus {
    Requested,
    Approved,
    Paid,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reimbursement {
    pub id: u64,
    pub reimbursement_code: String,
    pub employee_id: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub created_at: NaiveDateTime,
}

/// Expense line item of a reimbursement claim.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Expenditure {
    pub id: u64,
    pub reimbursement_id: u64,
    pub expense_date: NaiveDate,
    pub category: String,
    pub description: Option<String>,
    pub amount: f64,
    pub bill_link: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReimbursementReview {
    pub id: u64,
    pub reimbursement_id: u64,
    pub reviewer_id: Option<u64>,
    pub comment: String,
    pub created_at: NaiveDateTime,
}
