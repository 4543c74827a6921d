use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::config::{DEFAULT_PAGE_SIZE, PAGE_SIZE_OPTIONS};
use crate::models::email::MessageSummary;
use crate::services::gmail_service::{MailProvider, ProviderError};

/// The current mailbox snapshot.
///
/// Indices handed out by this store are positions in the visible list (the
/// provider snapshot minus locally deleted ids) and go stale on any refresh or
/// deletion.
#[derive(Debug, Clone, Default)]
pub struct MailStore {
    messages: Vec<MessageSummary>,
    deleted: HashSet<String>,
    last_fetch: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageEntry {
    pub number: usize,
    #[serde(flatten)]
    pub message: MessageSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total: usize,
    pub messages: Vec<PageEntry>,
}

impl MailStore {
    pub fn new(messages: Vec<MessageSummary>) -> Self {
        let mut store = MailStore::default();
        store.replace(messages);
        store
    }

    /// Replaces the snapshot wholesale and forgets local deletions.
    pub fn replace(&mut self, messages: Vec<MessageSummary>) {
        self.messages = messages;
        self.deleted.clear();
        self.last_fetch = Some(Utc::now());
    }

    /// Refetches from the provider. On failure the snapshot is emptied and the
    /// error handed back to the caller.
    pub async fn refresh(
        &mut self,
        provider: &dyn MailProvider,
        max_results: usize,
    ) -> Result<usize, ProviderError> {
        match provider.list_messages(max_results).await {
            Ok(messages) => {
                info!("Mailbox refreshed with {} messages", messages.len());
                self.replace(messages);
                Ok(self.len())
            }
            Err(e) => {
                warn!("Mailbox refresh failed: {}", e);
                self.replace(Vec::new());
                Err(e)
            }
        }
    }

    fn visible(&self) -> impl Iterator<Item = &MessageSummary> {
        self.messages.iter().filter(move |m| !self.deleted.contains(&m.id))
    }

    pub fn messages(&self) -> Vec<&MessageSummary> {
        self.visible().collect()
    }

    pub fn len(&self) -> usize {
        self.visible().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&MessageSummary> {
        self.visible().nth(index)
    }

    /// `get` for raw LLM arguments, which may be negative.
    pub fn get_signed(&self, index: i64) -> Option<&MessageSummary> {
        usize::try_from(index).ok().and_then(|i| self.get(i))
    }

    pub fn find(&self, message_id: &str) -> Option<&MessageSummary> {
        self.visible().find(|m| m.id == message_id)
    }

    /// Ids of the visible snapshot.
    pub fn ids(&self) -> HashSet<String> {
        self.visible().map(|m| m.id.clone()).collect()
    }

    /// Hides a message from the visible list without refetching.
    pub fn mark_deleted(&mut self, message_id: &str) -> bool {
        self.deleted.insert(message_id.to_string())
    }

    pub fn is_deleted(&self, message_id: &str) -> bool {
        self.deleted.contains(message_id)
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        self.last_fetch
    }

    /// Splits raw indices into in-range ones (deduplicated, order kept) and the
    /// user-facing numbers (`index + 1`) of the rest.
    pub fn partition_indices(&self, indices: &[i64]) -> (Vec<usize>, Vec<i64>) {
        let len = self.len();
        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        for &index in indices {
            match usize::try_from(index) {
                Ok(i) if i < len => {
                    if !valid.contains(&i) {
                        valid.push(i);
                    }
                }
                _ => {
                    let number = index.saturating_add(1);
                    if !invalid.contains(&number) {
                        invalid.push(number);
                    }
                }
            }
        }
        (valid, invalid)
    }

    /// One page of the visible list. `page` is 0-based and clamped to the
    /// last page; unsupported page sizes fall back to the default.
    pub fn page(&self, page: usize, page_size: usize) -> Page {
        let page_size = if PAGE_SIZE_OPTIONS.contains(&page_size) {
            page_size
        } else {
            DEFAULT_PAGE_SIZE
        };
        let total = self.len();
        let total_pages = std::cmp::max(1, (total + page_size - 1) / page_size);
        let page = page.min(total_pages - 1);
        let start = page * page_size;

        let messages = self
            .visible()
            .enumerate()
            .skip(start)
            .take(page_size)
            .map(|(i, m)| PageEntry {
                number: i + 1,
                message: m.clone(),
            })
            .collect();

        Page {
            page,
            page_size,
            total_pages,
            total,
            messages,
        }
    }
}
