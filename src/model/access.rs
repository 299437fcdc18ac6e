use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vertical {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Position {
    pub id: u64,
    pub name: String,
}

/// An application screen, addressed by its front-end component name.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Page {
    pub id: u64,
    pub name: String,
    pub component: String,
}

/// Grants visibility of one page to one (vertical, position) role.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoleAccess {
    pub id: u64,
    pub vertical_id: u64,
    pub position_id: u64,
    pub page_id: u64,
    pub vertical: String,
    pub position: String,
    pub component: String,
}
