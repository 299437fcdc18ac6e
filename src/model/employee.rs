use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Employee {
    pub id: u64,
    pub employee_code: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub pan_number: Option<String>,
    pub designation: Option<String>,
    pub date_of_joining: Option<NaiveDate>,
    pub salary: Option<f64>,
    pub address: Option<String>,
    pub created_at: NaiveDateTime,
}
