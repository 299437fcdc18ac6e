use serde::{Deserialize, Serialize};

/// Bank account row; the same shape backs `employee_bank_details` and
/// `trainer_bank_details` (`owner_id` is the employee or trainer id).
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct BankDetail {
    pub id: u64,
    pub owner_id: u64,
    pub account_holder: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub bank_name: String,
    pub branch: Option<String>,
    pub is_active: bool,
}
