use std::collections::{HashMap, HashSet};

use log::{debug, info, warn};

use crate::models::email::FullContent;
use crate::services::email_parser::parse_raw_message;
use crate::services::gmail_service::{with_rate_limit_retry, MailProvider, RetryPolicy};

/// Parsed message bodies keyed by message id.
///
/// Failed fetches are cached too, so a broken message is not refetched on
/// every access; they stay until `invalidate`, `clear_all` or eviction by a
/// refresh.
#[derive(Debug, Clone, Default)]
pub struct ContentCache {
    entries: HashMap<String, FullContent>,
    retry: RetryPolicy,
}

impl ContentCache {
    pub fn with_retry_policy(retry: RetryPolicy) -> Self {
        ContentCache {
            entries: HashMap::new(),
            retry,
        }
    }

    pub async fn get_full_content(&mut self, provider: &dyn MailProvider, message_id: &str) -> FullContent {
        if let Some(hit) = self.entries.get(message_id) {
            debug!("Content cache hit for {}", message_id);
            return hit.clone();
        }

        let fetched = with_rate_limit_retry(self.retry, || provider.get_raw_message(message_id)).await;
        let content = match fetched {
            Ok(raw) => match parse_raw_message(&raw) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Failed to parse message {}: {}", message_id, e);
                    FullContent::error(format!("❌ 메일 내용을 해석하지 못했습니다: {}", e))
                }
            },
            Err(e) => {
                warn!("Failed to fetch message {}: {}", message_id, e);
                FullContent::error(e.user_message())
            }
        };
        self.entries.insert(message_id.to_string(), content.clone());
        content
    }

    pub fn peek(&self, message_id: &str) -> Option<&FullContent> {
        self.entries.get(message_id)
    }

    pub fn invalidate(&mut self, message_id: &str) -> bool {
        self.entries.remove(message_id).is_some()
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Evicts entries whose ids are absent from `snapshot_ids`.
    pub fn retain_snapshot(&mut self, snapshot_ids: &HashSet<String>) -> Vec<String> {
        let removed: Vec<String> = self
            .entries
            .keys()
            .filter(|id| !snapshot_ids.contains(*id))
            .cloned()
            .collect();
        for id in &removed {
            self.entries.remove(id);
        }
        if !removed.is_empty() {
            info!("Evicted {} cached messages no longer in the mailbox", removed.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
