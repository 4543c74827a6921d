//! End-to-end chat turns over scripted mail provider and LLM doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use serde_json::Value;

use deepmail::models::email::MessageSummary;
use deepmail::models::mail_store::MailStore;
use deepmail::services::chat_service::process_chat;
use deepmail::services::command_service::CommandContext;
use deepmail::services::gmail_service::{MailProvider, ProviderError};
use deepmail::services::llm_service::{ChatReply, ChatRequest, LlmClient, LlmError, Role, ToolCall, ToolChoice};
use deepmail::services::phishing_service::PhishingScorer;
use deepmail::UserSession;

mock! {
    pub Provider {}

    #[async_trait]
    impl MailProvider for Provider {
        async fn list_messages(&self, max_results: usize) -> Result<Vec<MessageSummary>, ProviderError>;
        async fn get_raw_message(&self, message_id: &str) -> Result<Vec<u8>, ProviderError>;
        async fn trash_message(&self, message_id: &str) -> Result<(), ProviderError>;
        async fn profile(&self) -> Result<String, ProviderError>;
    }
}

mock! {
    pub Llm {}

    #[async_trait]
    impl LlmClient for Llm {
        async fn chat(&self, request: ChatRequest) -> Result<ChatReply, LlmError>;
        async fn web_search(&self, prompt: String) -> Result<String, LlmError>;
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn mail(id: &str, subject: &str, snippet: &str) -> MessageSummary {
    MessageSummary {
        id: id.to_string(),
        subject: subject.to_string(),
        sender: format!("{}@example.com", id),
        snippet: snippet.to_string(),
        date: None,
    }
}

fn session_of(mails: Vec<MessageSummary>) -> UserSession {
    UserSession {
        mailbox: MailStore::new(mails),
        ..UserSession::default()
    }
}

fn missing_model() -> PhishingScorer {
    PhishingScorer::load(std::path::Path::new("models/does-not-exist.json"))
}

/// LLM double that selects `call` first and then phrases whatever tool result
/// it was given, exposing that result through `seen`.
fn scripted_llm(call: ToolCall, seen: Arc<std::sync::Mutex<Option<Value>>>) -> MockLlm {
    let mut llm = MockLlm::new();
    let round = Arc::new(AtomicUsize::new(0));
    llm.expect_chat().times(2).returning(move |request| {
        if round.fetch_add(1, Ordering::SeqCst) == 0 {
            return Ok(ChatReply::tool_calls(vec![call.clone()]));
        }
        assert_eq!(request.tool_choice, ToolChoice::None);
        let tool = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Tool)
            .expect("tool result forwarded");
        let result: Value = serde_json::from_str(tool.content.as_deref().unwrap()).unwrap();
        let phrased = result["message"]
            .as_str()
            .or_else(|| result["error"].as_str())
            .unwrap_or("완료했습니다.")
            .to_string();
        *seen.lock().unwrap() = Some(result);
        Ok(ChatReply::text(phrased))
    });
    llm
}

#[tokio::test]
async fn test_delete_second_mail_by_number() {
    init_logging();
    let mut provider = MockProvider::new();
    provider
        .expect_trash_message()
        .withf(|id| id == "b")
        .times(1)
        .returning(|_| Ok(()));

    let seen = Arc::new(std::sync::Mutex::new(None));
    let llm = scripted_llm(
        ToolCall::new("call_1", "delete_mails_by_indices", r#"{"indices": [1]}"#),
        seen.clone(),
    );
    let scorer = missing_model();
    let mut session = session_of(vec![
        mail("a", "Team lunch", "friday"),
        mail("b", "Quarterly invoice", "please pay"),
        mail("c", "Newsletter", "weekly"),
    ]);

    let turn = {
        let mut ctx = CommandContext {
            session: &mut session,
            provider: &provider,
            llm: &llm,
            scorer: &scorer,
        };
        process_chat(&mut ctx, "2번 메일 삭제해줘").await
    };

    assert!(turn.mailbox_changed);
    assert_eq!(turn.operation.as_deref(), Some("delete_mails_by_indices"));
    assert!(turn.response.contains("2번 메일"));
    assert!(turn.response.contains("Quarterly invoice"));
    assert_eq!(session.mailbox.len(), 2);
    assert!(session.mailbox.find("b").is_none());
}

#[tokio::test]
async fn test_search_invoice_summarizes_each_hit() {
    init_logging();
    let provider = MockProvider::new();
    let mut llm = MockLlm::new();
    let round = Arc::new(AtomicUsize::new(0));
    let seen: Arc<std::sync::Mutex<Option<Value>>> = Arc::new(std::sync::Mutex::new(None));
    let captured = seen.clone();
    llm.expect_chat().times(4).returning(move |request| {
        match round.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(ChatReply::tool_calls(vec![ToolCall::new(
                "call_1",
                "search_mails",
                r#"{"query": "invoice", "max_results": 10}"#,
            )])),
            1 | 2 => Ok(ChatReply::text("청구서 메일입니다.")),
            _ => {
                let tool = request.messages.iter().find(|m| m.role == Role::Tool).unwrap();
                *captured.lock().unwrap() = serde_json::from_str(tool.content.as_deref().unwrap()).ok();
                Ok(ChatReply::text("invoice 관련 메일 2개를 찾았습니다."))
            }
        }
    });
    let scorer = missing_model();
    let mut session = session_of(vec![
        mail("a", "Invoice #1", "amount due"),
        mail("b", "Hi", "hello"),
        mail("c", "Trip", "see the INVOICE attached"),
        mail("d", "News", "digest"),
        mail("e", "Party", "saturday"),
    ]);

    let turn = {
        let mut ctx = CommandContext {
            session: &mut session,
            provider: &provider,
            llm: &llm,
            scorer: &scorer,
        };
        process_chat(&mut ctx, "invoice 메일 찾아줘").await
    };

    assert_eq!(turn.operation.as_deref(), Some("search_mails"));
    let result = seen.lock().unwrap().clone().unwrap();
    assert_eq!(result["count"], 2);
    let subjects: Vec<&str> = result["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["subject"].as_str().unwrap())
        .collect();
    assert_eq!(subjects, vec!["Invoice #1", "Trip"]);
    assert!(result["results"]
        .as_array()
        .unwrap()
        .iter()
        .all(|h| h["summary"] == "청구서 메일입니다."));
}

#[tokio::test]
async fn test_phishing_check_without_model_does_not_crash() {
    init_logging();
    let provider = MockProvider::new();
    let seen = Arc::new(std::sync::Mutex::new(None));
    let llm = scripted_llm(
        ToolCall::new("call_1", "check_email_phishing", r#"{"index": 0}"#),
        seen.clone(),
    );
    let scorer = missing_model();
    let mut session = session_of(vec![mail("a", "Verify your account", "login now")]);

    let turn = {
        let mut ctx = CommandContext {
            session: &mut session,
            provider: &provider,
            llm: &llm,
            scorer: &scorer,
        };
        process_chat(&mut ctx, "1번 메일 피싱인지 확인해줘").await
    };

    let result = seen.lock().unwrap().clone().unwrap();
    let error = result["error"].as_str().unwrap();
    assert!(error.contains("model_path="));
    assert!(error.contains("does-not-exist.json"));
    assert!(!turn.response.is_empty());
    assert!(!turn.mailbox_changed);
}

#[tokio::test]
async fn test_out_of_range_number_is_reported_one_based() {
    init_logging();
    let provider = MockProvider::new();
    let seen = Arc::new(std::sync::Mutex::new(None));
    let llm = scripted_llm(
        ToolCall::new("call_1", "get_mail_content", r#"{"index": 5}"#),
        seen.clone(),
    );
    let scorer = missing_model();
    let mut session = session_of(vec![mail("a", "One", "1"), mail("b", "Two", "2")]);

    let turn = {
        let mut ctx = CommandContext {
            session: &mut session,
            provider: &provider,
            llm: &llm,
            scorer: &scorer,
        };
        process_chat(&mut ctx, "6번 메일 보여줘").await
    };

    assert_eq!(turn.response, "6번 메일이 존재하지 않습니다. (총 2개 메일)");
}
