use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct SignUpReq {
    pub email: String,
    pub password: String,
    pub vertical_id: u64,
    pub position_id: u64,
    pub employee_id: u64,
}

#[derive(Deserialize)]
pub struct SignInReq {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String, // email
    pub vertical_id: u64,
    pub position_id: u64,
    pub employee_id: u64,
    pub exp: usize,
    pub jti: String,
}
