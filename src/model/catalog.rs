use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Service {
    pub id: u64,
    pub code: String,
    pub name: String,
}

/// A bundled offering of services.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Plan {
    pub id: u64,
    pub code: String,
    pub name: String,
    pub duration: String,
    pub file_link: Option<String>,
}
