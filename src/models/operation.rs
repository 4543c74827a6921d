//! The closed set of mailbox operations the LLM may call.
//!
//! `OperationKind` is the single table both the tool schema sent to the model
//! and the argument parser are generated from.

use serde_json::{json, Value};

use crate::models::command_result::OpError;
use crate::services::llm_service::ToolDefinition;

pub const DEFAULT_SEARCH_RESULTS: usize = 10;
pub const DEFAULT_BATCH_MAILS: usize = 10;
pub const DEFAULT_PHISHING_THRESHOLD: f64 = 0.5;
pub const DEFAULT_STATISTICS_MAILS: usize = 30;
pub const DEFAULT_LINK_RISK_MAILS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    MoveToTrash,
    DeleteByIndices,
    SummarizeByIndices,
    GetMailContent,
    CheckPhishing,
    SearchMails,
    BatchPhishingDelete,
    MailStatistics,
    AnalyzeLinkRisk,
    BatchAnalyzeLinkRisk,
    WebSearchMailContent,
    AgentAnalysis,
}

impl OperationKind {
    pub const ALL: [OperationKind; 12] = [
        OperationKind::MoveToTrash,
        OperationKind::DeleteByIndices,
        OperationKind::SummarizeByIndices,
        OperationKind::GetMailContent,
        OperationKind::CheckPhishing,
        OperationKind::SearchMails,
        OperationKind::BatchPhishingDelete,
        OperationKind::MailStatistics,
        OperationKind::AnalyzeLinkRisk,
        OperationKind::BatchAnalyzeLinkRisk,
        OperationKind::WebSearchMailContent,
        OperationKind::AgentAnalysis,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OperationKind::MoveToTrash => "move_message_to_trash",
            OperationKind::DeleteByIndices => "delete_mails_by_indices",
            OperationKind::SummarizeByIndices => "summarize_mails_by_indices",
            OperationKind::GetMailContent => "get_mail_content",
            OperationKind::CheckPhishing => "check_email_phishing",
            OperationKind::SearchMails => "search_mails",
            OperationKind::BatchPhishingDelete => "batch_phishing_delete",
            OperationKind::MailStatistics => "get_mail_statistics",
            OperationKind::AnalyzeLinkRisk => "analyze_link_risk",
            OperationKind::BatchAnalyzeLinkRisk => "batch_analyze_link_risk",
            OperationKind::WebSearchMailContent => "web_search_mail_content",
            OperationKind::AgentAnalysis => "agent_analysis",
        }
    }

    pub fn from_name(name: &str) -> Option<OperationKind> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            OperationKind::MoveToTrash => "Move one mail to the trash by its Gmail message id.",
            OperationKind::DeleteByIndices => {
                "Delete several mails by number. Mail number N (as the user sees it, starting at 1) is index N-1."
            }
            OperationKind::SummarizeByIndices => {
                "Summarize several mails by number. Mail number N is index N-1."
            }
            OperationKind::GetMailContent => "Return subject, sender and snippet of mail number N (index N-1).",
            OperationKind::CheckPhishing => {
                "Check whether mail number N (index N-1) is phishing using the local classifier."
            }
            OperationKind::SearchMails => {
                "Search mails whose subject, sender or snippet contains the query (case-insensitive) and summarize each hit."
            }
            OperationKind::BatchPhishingDelete => {
                "Scan the most recent mails with the phishing classifier and trash every mail whose phishing probability is at least the threshold."
            }
            OperationKind::MailStatistics => {
                "Aggregate sender, sender domain and suspicious keyword statistics over recent mails."
            }
            OperationKind::AnalyzeLinkRisk => {
                "Extract the links of mail number N (index N-1) and assess the risk of their domains with web search."
            }
            OperationKind::BatchAnalyzeLinkRisk => "Run link risk analysis on the first n mails.",
            OperationKind::WebSearchMailContent => {
                "Analyze mail number N (index N-1) with web search, optionally focused on a specific question."
            }
            OperationKind::AgentAnalysis => {
                "Run a multi-step security analysis of mail number N (index N-1) combining mailbox functions and web search."
            }
        }
    }

    pub fn parameters(self) -> Value {
        let index = json!({
            "type": "integer",
            "description": "0-based index: mail number N is index N-1"
        });
        let indices = json!({
            "type": "array",
            "items": { "type": "integer" },
            "description": "0-based indices: mail number N is index N-1"
        });
        match self {
            OperationKind::MoveToTrash => json!({
                "type": "object",
                "properties": { "message_id": { "type": "string", "description": "Gmail message id" } },
                "required": ["message_id"]
            }),
            OperationKind::DeleteByIndices | OperationKind::SummarizeByIndices => json!({
                "type": "object",
                "properties": { "indices": indices },
                "required": ["indices"]
            }),
            OperationKind::GetMailContent
            | OperationKind::CheckPhishing
            | OperationKind::AnalyzeLinkRisk
            | OperationKind::AgentAnalysis => json!({
                "type": "object",
                "properties": { "index": index },
                "required": ["index"]
            }),
            OperationKind::SearchMails => json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Text to look for" },
                    "max_results": { "type": "integer", "description": "Maximum number of hits", "default": DEFAULT_SEARCH_RESULTS }
                },
                "required": ["query"]
            }),
            OperationKind::BatchPhishingDelete => json!({
                "type": "object",
                "properties": {
                    "max_mails": { "type": "integer", "description": "How many recent mails to scan", "default": DEFAULT_BATCH_MAILS },
                    "threshold": { "type": "number", "description": "Phishing probability between 0 and 1", "default": DEFAULT_PHISHING_THRESHOLD }
                }
            }),
            OperationKind::MailStatistics => json!({
                "type": "object",
                "properties": {
                    "max_mails": { "type": "integer", "description": "How many recent mails to aggregate", "default": DEFAULT_STATISTICS_MAILS }
                }
            }),
            OperationKind::BatchAnalyzeLinkRisk => json!({
                "type": "object",
                "properties": {
                    "n": { "type": "integer", "description": "How many mails from the top to analyze", "default": DEFAULT_LINK_RISK_MAILS }
                }
            }),
            OperationKind::WebSearchMailContent => json!({
                "type": "object",
                "properties": {
                    "index": index,
                    "query": { "type": "string", "description": "Optional question to research about the mail" }
                },
                "required": ["index"]
            }),
        }
    }

    pub fn tool_definition(self) -> ToolDefinition {
        ToolDefinition::function(self.name(), self.description(), self.parameters())
    }
}

/// Tool schema for every operation except `exclude`.
pub fn tool_definitions(exclude: &[OperationKind]) -> Vec<ToolDefinition> {
    OperationKind::ALL
        .iter()
        .filter(|kind| !exclude.contains(kind))
        .map(|kind| kind.tool_definition())
        .collect()
}

/// A validated operation call. Indices are raw 0-based values from the model
/// and are bounds-checked against the mailbox at execution time.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    MoveToTrash { message_id: String },
    DeleteByIndices { indices: Vec<i64> },
    SummarizeByIndices { indices: Vec<i64> },
    GetMailContent { index: i64 },
    CheckPhishing { index: i64 },
    SearchMails { query: String, max_results: usize },
    BatchPhishingDelete { max_mails: usize, threshold: f64 },
    MailStatistics { max_mails: usize },
    AnalyzeLinkRisk { index: i64 },
    BatchAnalyzeLinkRisk { n: usize },
    WebSearchMailContent { index: i64, query: Option<String> },
    AgentAnalysis { index: i64 },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::MoveToTrash { .. } => OperationKind::MoveToTrash,
            Operation::DeleteByIndices { .. } => OperationKind::DeleteByIndices,
            Operation::SummarizeByIndices { .. } => OperationKind::SummarizeByIndices,
            Operation::GetMailContent { .. } => OperationKind::GetMailContent,
            Operation::CheckPhishing { .. } => OperationKind::CheckPhishing,
            Operation::SearchMails { .. } => OperationKind::SearchMails,
            Operation::BatchPhishingDelete { .. } => OperationKind::BatchPhishingDelete,
            Operation::MailStatistics { .. } => OperationKind::MailStatistics,
            Operation::AnalyzeLinkRisk { .. } => OperationKind::AnalyzeLinkRisk,
            Operation::BatchAnalyzeLinkRisk { .. } => OperationKind::BatchAnalyzeLinkRisk,
            Operation::WebSearchMailContent { .. } => OperationKind::WebSearchMailContent,
            Operation::AgentAnalysis { .. } => OperationKind::AgentAnalysis,
        }
    }

    /// Builds an operation from a function name and its JSON arguments.
    pub fn parse(name: &str, args: &Value) -> Result<Operation, OpError> {
        let kind = OperationKind::from_name(name).ok_or_else(|| OpError::UnknownFunction(name.to_string()))?;
        let op = match kind {
            OperationKind::MoveToTrash => Operation::MoveToTrash {
                message_id: required_string(args, "message_id")?,
            },
            OperationKind::DeleteByIndices => Operation::DeleteByIndices {
                indices: required_indices(args, "indices")?,
            },
            OperationKind::SummarizeByIndices => Operation::SummarizeByIndices {
                indices: required_indices(args, "indices")?,
            },
            OperationKind::GetMailContent => Operation::GetMailContent {
                index: required_int(args, "index")?,
            },
            OperationKind::CheckPhishing => Operation::CheckPhishing {
                index: required_int(args, "index")?,
            },
            OperationKind::SearchMails => Operation::SearchMails {
                query: required_string(args, "query")?,
                max_results: optional_count(args, "max_results", DEFAULT_SEARCH_RESULTS)?,
            },
            OperationKind::BatchPhishingDelete => {
                let threshold = match args.get("threshold") {
                    None | Some(Value::Null) => DEFAULT_PHISHING_THRESHOLD,
                    Some(v) => as_f64(v).ok_or_else(|| invalid("threshold", "숫자여야 합니다"))?,
                };
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(invalid("threshold", "0과 1 사이여야 합니다"));
                }
                Operation::BatchPhishingDelete {
                    max_mails: optional_count(args, "max_mails", DEFAULT_BATCH_MAILS)?,
                    threshold,
                }
            }
            OperationKind::MailStatistics => Operation::MailStatistics {
                max_mails: optional_count(args, "max_mails", DEFAULT_STATISTICS_MAILS)?,
            },
            OperationKind::AnalyzeLinkRisk => Operation::AnalyzeLinkRisk {
                index: required_int(args, "index")?,
            },
            OperationKind::BatchAnalyzeLinkRisk => Operation::BatchAnalyzeLinkRisk {
                n: optional_count(args, "n", DEFAULT_LINK_RISK_MAILS)?,
            },
            OperationKind::WebSearchMailContent => Operation::WebSearchMailContent {
                index: required_int(args, "index")?,
                query: args
                    .get("query")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .map(str::to_string),
            },
            OperationKind::AgentAnalysis => Operation::AgentAnalysis {
                index: required_int(args, "index")?,
            },
        };
        Ok(op)
    }
}

fn invalid(name: &str, detail: &str) -> OpError {
    OpError::InvalidArgument {
        name: name.to_string(),
        detail: detail.to_string(),
    }
}

fn present<'a>(args: &'a Value, name: &str) -> Result<&'a Value, OpError> {
    match args.get(name) {
        None | Some(Value::Null) => Err(OpError::MissingArgument(name.to_string())),
        Some(v) => Ok(v),
    }
}

/// Models sometimes quote numbers; both `3` and `"3"` are accepted.
fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn required_string(args: &Value, name: &str) -> Result<String, OpError> {
    let value = present(args, name)?;
    let s = value.as_str().ok_or_else(|| invalid(name, "문자열이어야 합니다"))?.trim();
    if s.is_empty() {
        return Err(OpError::MissingArgument(name.to_string()));
    }
    Ok(s.to_string())
}

fn required_int(args: &Value, name: &str) -> Result<i64, OpError> {
    as_i64(present(args, name)?).ok_or_else(|| invalid(name, "정수여야 합니다"))
}

fn required_indices(args: &Value, name: &str) -> Result<Vec<i64>, OpError> {
    let value = present(args, name)?;
    let items = value.as_array().ok_or_else(|| invalid(name, "정수 배열이어야 합니다"))?;
    if items.is_empty() {
        return Err(OpError::MissingArgument(name.to_string()));
    }
    items
        .iter()
        .map(|item| as_i64(item).ok_or_else(|| invalid(name, "정수 배열이어야 합니다")))
        .collect()
}

fn optional_count(args: &Value, name: &str, default: usize) -> Result<usize, OpError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => match as_i64(v) {
            Some(n) if n > 0 => Ok(n as usize),
            _ => Err(invalid(name, "1 이상의 정수여야 합니다")),
        },
    }
}
