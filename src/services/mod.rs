pub mod agent_service;
pub mod chat_service;
pub mod command_service;
pub mod email_parser;
pub mod email_service;
pub mod gmail_service;
pub mod link_service;
pub mod llm_service;
pub mod mail_stats;
pub mod phishing_service;
