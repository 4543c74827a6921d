pub mod command_result;
pub mod content_cache;
pub mod email;
pub mod mail_store;
pub mod operation;
pub mod user_session;
