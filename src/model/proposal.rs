use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Uploaded,
    MailSent,
    FollowUp,
    Active,
    Success,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Proposal {
    pub id: u64,
    pub proposal_uid: String,
    pub college_code: String,
    pub proposal_code: String,
    pub issue_date: Option<NaiveDate>,
    pub duration: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: String,
    pub employee_id: Option<u64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProposalFile {
    pub id: u64,
    pub proposal_id: u64,
    pub file_link: String,
    pub uploaded_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_text_matches_column_values() {
        assert_eq!(ProposalStatus::MailSent.as_ref(), "mail_sent");
        assert_eq!(ProposalStatus::FollowUp.to_string(), "follow_up");
        assert_eq!(
            ProposalStatus::from_str("success").unwrap(),
            ProposalStatus::Success
        );
        assert!(ProposalStatus::from_str("archived").is_err());
    }

    #[test]
    fn status_deserializes_from_snake_case() {
        let status: ProposalStatus = serde_json::from_str("\"mail_sent\"").unwrap();
        assert_eq!(status, ProposalStatus::MailSent);
    }
}
