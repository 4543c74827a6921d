use log::info;

use crate::models::user_session::UserSession;
use crate::services::gmail_service::{MailProvider, ProviderError};

/// Refetches the mailbox and drops cached bodies of mails that left it.
pub async fn load_emails(
    session: &mut UserSession,
    provider: &dyn MailProvider,
    max_results: usize,
) -> Result<usize, ProviderError> {
    info!("Fetching up to {} emails from Gmail...", max_results);
    let result = session.mailbox.refresh(provider, max_results).await;
    let evicted = session.contents.retain_snapshot(&session.mailbox.ids());
    info!("Mailbox holds {} emails, {} cached bodies evicted", session.mailbox.len(), evicted.len());
    result
}
