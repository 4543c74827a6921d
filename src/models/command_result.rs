use serde::Serialize;
use serde_json::Value;

use crate::services::mail_stats::MailStatistics;
use crate::services::phishing_service::PhishingVerdict;

/// Why an operation could not run. Serialized to the LLM as `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OpError {
    #[error("{0}가 필요합니다.")]
    MissingArgument(String),

    #[error("잘못된 인자 {name}: {detail}")]
    InvalidArgument { name: String, detail: String },

    #[error("알 수 없는 함수: {0}")]
    UnknownFunction(String),

    #[error("{number}번 메일이 존재하지 않습니다. (총 {total}개 메일)")]
    IndexOutOfRange { number: i64, total: usize },

    #[error("유효한 메일 번호가 없습니다: {}", join_numbers(.0))]
    NoValidIndices(Vec<i64>),

    #[error("메일함이 비어 있습니다.")]
    EmptyMailbox,

    #[error("{0}")]
    Provider(String),

    #[error("{0}")]
    Llm(String),

    #[error("{0}")]
    Scorer(String),
}

fn join_numbers(numbers: &[i64]) -> String {
    numbers
        .iter()
        .map(|n| format!("{}번", n))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrashResult {
    pub success: bool,
    pub message_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletedMail {
    pub number: usize,
    pub subject: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteResult {
    pub success: bool,
    pub results: Vec<DeletedMail>,
    pub invalid_numbers: Vec<i64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummariesResult {
    pub summaries: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub invalid_numbers: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailContentResult {
    pub number: usize,
    pub subject: String,
    pub sender: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhishingResult {
    pub subject: String,
    pub sender: String,
    pub result: PhishingVerdict,
    pub probability: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub number: usize,
    pub subject: String,
    pub sender: String,
    pub snippet: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub query: String,
    pub count: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedMail {
    pub number: usize,
    pub subject: String,
    pub sender: String,
    pub probability: f64,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchDeleteResult {
    pub checked: usize,
    pub phishing_found: usize,
    pub deleted_count: usize,
    pub threshold: f64,
    pub flagged: Vec<FlaggedMail>,
    pub errors: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkRiskResult {
    pub number: usize,
    pub subject: String,
    pub urls: Vec<String>,
    pub domains: Vec<String>,
    pub analysis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchLinkRiskResult {
    pub analyzed: usize,
    pub results: Vec<LinkRiskResult>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub number: usize,
    pub subject: String,
    pub analysis: String,
    pub completed: bool,
}

/// Outcome of one dispatched operation, as handed back to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandResult {
    Trash(TrashResult),
    Delete(DeleteResult),
    Summaries(SummariesResult),
    MailContent(MailContentResult),
    Phishing(PhishingResult),
    Search(SearchResult),
    BatchDelete(BatchDeleteResult),
    Statistics(MailStatistics),
    LinkRisk(LinkRiskResult),
    BatchLinkRisk(BatchLinkRiskResult),
    Analysis(AnalysisResult),
    Error(ErrorPayload),
}

impl CommandResult {
    pub fn error(error: &OpError) -> Self {
        CommandResult::Error(ErrorPayload {
            error: error.to_string(),
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CommandResult::Error(_))
    }

    /// True when the operation removed at least one mail from the mailbox.
    pub fn changed_mailbox(&self) -> bool {
        match self {
            CommandResult::Trash(r) => r.success,
            CommandResult::Delete(r) => r.results.iter().any(|d| d.success),
            CommandResult::BatchDelete(r) => r.deleted_count > 0,
            _ => false,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }))
    }
}

macro_rules! impl_from_payload {
    ($($payload:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$payload> for CommandResult {
                fn from(payload: $payload) -> Self {
                    CommandResult::$variant(payload)
                }
            }
        )*
    };
}

impl_from_payload! {
    TrashResult => Trash,
    DeleteResult => Delete,
    SummariesResult => Summaries,
    MailContentResult => MailContent,
    PhishingResult => Phishing,
    SearchResult => Search,
    BatchDeleteResult => BatchDelete,
    MailStatistics => Statistics,
    LinkRiskResult => LinkRisk,
    BatchLinkRiskResult => BatchLinkRisk,
    AnalysisResult => Analysis,
}

impl<T: Into<CommandResult>> From<Result<T, OpError>> for CommandResult {
    fn from(result: Result<T, OpError>) -> Self {
        match result {
            Ok(payload) => payload.into(),
            Err(e) => CommandResult::error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serializes_as_error_object() {
        let result = CommandResult::error(&OpError::IndexOutOfRange { number: 7, total: 3 });
        assert_eq!(
            result.to_json(),
            serde_json::json!({"error": "7번 메일이 존재하지 않습니다. (총 3개 메일)"})
        );
        assert!(result.is_error());
    }

    #[test]
    fn test_missing_argument_message() {
        assert_eq!(OpError::MissingArgument("index".into()).to_string(), "index가 필요합니다.");
        assert_eq!(
            OpError::NoValidIndices(vec![5, 9]).to_string(),
            "유효한 메일 번호가 없습니다: 5번, 9번"
        );
    }

    #[test]
    fn test_payload_serializes_without_wrapper() {
        let result: CommandResult = Ok::<_, OpError>(MailContentResult {
            number: 2,
            subject: "s".into(),
            sender: "a@b.c".into(),
            snippet: "hi".into(),
        })
        .into();
        let json = result.to_json();
        assert_eq!(json["number"], 2);
        assert_eq!(json["subject"], "s");
        assert!(json.get("MailContent").is_none());
    }

    #[test]
    fn test_phishing_verdict_is_snake_case() {
        let result = CommandResult::from(PhishingResult {
            subject: "s".into(),
            sender: "x".into(),
            result: PhishingVerdict::NotPhishing,
            probability: None,
        });
        let json = result.to_json();
        assert_eq!(json["result"], "not_phishing");
        assert!(json["probability"].is_null());
    }

    #[test]
    fn test_changed_mailbox_only_for_successful_deletes() {
        let failed = CommandResult::from(TrashResult {
            success: false,
            message_id: "m".into(),
            message: "x".into(),
        });
        assert!(!failed.changed_mailbox());
        let batch = CommandResult::from(BatchDeleteResult {
            checked: 3,
            phishing_found: 1,
            deleted_count: 1,
            threshold: 0.5,
            flagged: vec![],
            errors: vec![],
            message: String::new(),
        });
        assert!(batch.changed_mailbox());
    }
}
