pub mod db_utils;
pub mod mailer;
pub mod pan;
pub mod template;
