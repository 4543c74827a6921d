use std::sync::Arc;

use crate::config::Settings;
use crate::global_session_manager::GlobalSessionManager;
use crate::services::gmail_service::MailProvider;
use crate::services::llm_service::LlmClient;
use crate::services::phishing_service::PhishingScorer;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub provider: Arc<dyn MailProvider>,
    pub llm: Arc<dyn LlmClient>,
    pub scorer: Arc<PhishingScorer>,
    pub session_manager: GlobalSessionManager,
}
