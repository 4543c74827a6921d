use crate::models::content_cache::ContentCache;
use crate::models::mail_store::MailStore;
use crate::services::llm_service::ChatMessage;

/// Everything one browser session owns. Handlers receive it explicitly.
#[derive(Debug, Clone, Default)]
pub struct UserSession {
    pub mailbox: MailStore,
    pub contents: ContentCache,
    /// User and assistant turns shown in the chat pane.
    pub history: Vec<ChatMessage>,
}

impl UserSession {
    pub fn record_turn(&mut self, user_input: &str, response: &str) {
        self.history.push(ChatMessage::user(user_input));
        self.history.push(ChatMessage::assistant(response));
    }
}
