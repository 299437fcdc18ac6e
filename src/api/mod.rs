pub mod access;
pub mod attendance;
pub mod bank_detail;
pub mod catalog;
pub mod college;
pub mod document;
pub mod employee;
pub mod exam;
pub mod leave_request;
pub mod mail;
pub mod proposal;
pub mod reimbursement;
pub mod trainer;
pub mod zip_upload;
