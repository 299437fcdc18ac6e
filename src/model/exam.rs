use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Exam {
    pub id: u64,
    pub exam_code: String,
    pub title: String,
    pub duration_minutes: u32,
    pub question_count: u32,
    pub file_link: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExamCategory {
    pub id: u64,
    pub name: String,
}

/// Exam issued to a college batch.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExamCollege {
    pub id: u64,
    pub exam_id: u64,
    pub college_id: u64,
    pub exam_code: String,
    pub college_code: String,
    pub batch: String,
    pub issue_date: NaiveDate,
}
