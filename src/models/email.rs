use std::fmt;
use serde::{Deserialize, Serialize};

use crate::config::MAX_PROMPT_BODY_CHARS;

pub const NO_SUBJECT: &str = "제목 없음";
pub const NO_SENDER: &str = "발신자 없음";
pub const NO_RECIPIENT: &str = "수신자 없음";
pub const NO_DATE: &str = "날짜 없음";
const ERROR_PLACEHOLDER: &str = "오류";

/// One row of the mailbox list as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub snippet: String,
    #[serde(default)]
    pub date: Option<String>,
}

impl fmt::Display for MessageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Email:")?;
        writeln!(f, "  From: {}", self.sender)?;
        writeln!(f, "  Subject: {}", self.subject)?;
        if let Some(ref date) = self.date {
            writeln!(f, "  Date: {}", date)?;
        }
        writeln!(f, "  Snippet: {}", self.snippet)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub content_type: String,
    pub size: usize,
}

/// Fully decoded message. Error results keep the placeholder headers and carry
/// the failure text in `body_text`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullContent {
    pub subject: String,
    pub from: String,
    pub to: String,
    pub date: String,
    pub body_text: String,
    pub body_html: String,
    pub attachments: Vec<Attachment>,
    pub error: bool,
}

impl FullContent {
    pub fn error(message: impl Into<String>) -> Self {
        FullContent {
            subject: ERROR_PLACEHOLDER.to_string(),
            from: ERROR_PLACEHOLDER.to_string(),
            to: ERROR_PLACEHOLDER.to_string(),
            date: ERROR_PLACEHOLDER.to_string(),
            body_text: message.into(),
            body_html: String::new(),
            attachments: Vec::new(),
            error: true,
        }
    }

    /// Plain text for prompts: the text/plain body, else the HTML rendered as text.
    pub fn readable_text(&self) -> Option<String> {
        if self.error {
            return None;
        }
        if !self.body_text.trim().is_empty() {
            return Some(self.body_text.clone());
        }
        if !self.body_html.trim().is_empty() {
            let text = html_to_text(&self.body_html);
            if !text.trim().is_empty() {
                return Some(text);
            }
        }
        None
    }
}

pub fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100)
}

/// Cuts `text` to at most `MAX_PROMPT_BODY_CHARS` characters.
pub fn prompt_excerpt(text: &str) -> String {
    text.chars().take(MAX_PROMPT_BODY_CHARS).collect()
}

/// Lists summaries with their user-facing (1-based) numbers.
pub fn format_summaries(messages: &[&MessageSummary]) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(i, msg)| format!("{}. From: {} | Subject: {}", i + 1, msg.sender, msg.subject))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(text: &str, html: &str) -> FullContent {
        FullContent {
            subject: "s".into(),
            from: "f".into(),
            to: "t".into(),
            date: "d".into(),
            body_text: text.into(),
            body_html: html.into(),
            attachments: vec![],
            error: false,
        }
    }

    #[test]
    fn test_readable_text_prefers_plain_part() {
        let c = content("plain body", "<p>html body</p>");
        assert_eq!(c.readable_text().as_deref(), Some("plain body"));
    }

    #[test]
    fn test_readable_text_falls_back_to_html() {
        let c = content("   ", "<p>html body</p>");
        let text = c.readable_text().unwrap();
        assert!(text.contains("html body"));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn test_error_content_has_no_readable_text() {
        let c = FullContent::error("boom");
        assert!(c.error);
        assert_eq!(c.body_text, "boom");
        assert!(c.readable_text().is_none());
    }

    #[test]
    fn test_format_summaries_is_one_based() {
        let a = MessageSummary {
            id: "1".into(),
            subject: "Hello".into(),
            sender: "a@x.com".into(),
            snippet: "".into(),
            date: None,
        };
        let listing = format_summaries(&[&a]);
        assert_eq!(listing, "1. From: a@x.com | Subject: Hello");
    }
}
