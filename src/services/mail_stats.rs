use std::collections::HashMap;

use serde::Serialize;

use crate::models::email::MessageSummary;

pub const UNKNOWN_DOMAIN: &str = "알 수 없음";

const TOP_SENDERS: usize = 10;
const TOP_DOMAINS: usize = 5;

/// Words counted in subject and snippet.
pub const SUSPICIOUS_KEYWORDS: [&str; 13] = [
    "긴급", "urgent", "verify", "account", "password", "invoice", "payment", "click", "login", "계정", "비밀번호", "결제",
    "확인",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Count {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailStatistics {
    pub total: usize,
    pub top_senders: Vec<Count>,
    pub top_domains: Vec<Count>,
    pub keyword_counts: Vec<Count>,
    pub mails_with_links: usize,
}

/// Address part of a `From` header: `Name <a@b.c>` -> `a@b.c`.
fn sender_address(sender: &str) -> &str {
    match (sender.rfind('<'), sender.rfind('>')) {
        (Some(start), Some(end)) if start < end => sender[start + 1..end].trim(),
        _ => sender.trim(),
    }
}

pub fn sender_domain(sender: &str) -> String {
    let address = sender_address(sender);
    match address.rsplit_once('@') {
        Some((_, domain)) if !domain.is_empty() => domain.to_lowercase(),
        _ => UNKNOWN_DOMAIN.to_string(),
    }
}

/// Most frequent first; ties broken by first appearance.
fn top_counts(names: impl Iterator<Item = String>, limit: usize) -> Vec<Count> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for name in names {
        let entry = counts.entry(name.clone()).or_insert(0);
        if *entry == 0 {
            order.push(name);
        }
        *entry += 1;
    }
    let mut ranked: Vec<Count> = order
        .into_iter()
        .map(|name| {
            let count = counts[&name];
            Count { name, count }
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(limit);
    ranked
}

pub fn compute_statistics(messages: &[&MessageSummary]) -> MailStatistics {
    let top_senders = top_counts(messages.iter().map(|m| m.sender.clone()), TOP_SENDERS);
    let top_domains = top_counts(messages.iter().map(|m| sender_domain(&m.sender)), TOP_DOMAINS);

    let texts: Vec<String> = messages
        .iter()
        .map(|m| format!("{} {}", m.subject, m.snippet).to_lowercase())
        .collect();

    let keyword_counts = SUSPICIOUS_KEYWORDS
        .iter()
        .map(|keyword| Count {
            name: keyword.to_string(),
            count: texts.iter().map(|t| t.matches(keyword).count()).sum(),
        })
        .filter(|c| c.count > 0)
        .collect();

    let mails_with_links = texts
        .iter()
        .filter(|t| t.contains("http") || t.contains("www."))
        .count();

    MailStatistics {
        total: messages.len(),
        top_senders,
        top_domains,
        keyword_counts,
        mails_with_links,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(sender: &str, subject: &str, snippet: &str) -> MessageSummary {
        MessageSummary {
            id: subject.to_string(),
            subject: subject.to_string(),
            sender: sender.to_string(),
            snippet: snippet.to_string(),
            date: None,
        }
    }

    #[test]
    fn test_sender_domain() {
        assert_eq!(sender_domain("Alice <alice@Example.com>"), "example.com");
        assert_eq!(sender_domain("bob@corp.io"), "corp.io");
        assert_eq!(sender_domain("Mailer Daemon"), UNKNOWN_DOMAIN);
    }

    #[test]
    fn test_compute_statistics() {
        let mails = [
            mail("a@x.com", "URGENT: verify your account", "click http://x.co"),
            mail("a@x.com", "Invoice 42", "payment due"),
            mail("b@y.com", "긴급 계정 확인", "www.y.com 방문"),
        ];
        let refs: Vec<&MessageSummary> = mails.iter().collect();
        let stats = compute_statistics(&refs);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.top_senders[0], Count { name: "a@x.com".into(), count: 2 });
        assert_eq!(stats.top_domains[0].name, "x.com");
        assert_eq!(stats.mails_with_links, 2);

        let count_of = |k: &str| stats.keyword_counts.iter().find(|c| c.name == k).map(|c| c.count);
        assert_eq!(count_of("urgent"), Some(1));
        assert_eq!(count_of("긴급"), Some(1));
        assert_eq!(count_of("password"), None);
    }

    #[test]
    fn test_empty_mailbox_statistics() {
        let stats = compute_statistics(&[]);
        assert_eq!(stats.total, 0);
        assert!(stats.top_senders.is_empty());
        assert!(stats.keyword_counts.is_empty());
    }
}
