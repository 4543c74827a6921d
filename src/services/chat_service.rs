use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::SYSTEM_PROMPT;
use crate::models::command_result::CommandResult;
use crate::models::email::format_summaries;
use crate::models::operation::{tool_definitions, Operation, OperationKind};
use crate::services::agent_service;
use crate::services::command_service::{self, CommandContext};
use crate::services::llm_service::{ChatMessage, ChatRequest, LlmError, ToolCall, ToolChoice};

const PHISHING_EXPLAIN: &str = "위 피싱 검사 결과를 사용자에게 친절하게 설명해줘. \
판정 결과와 확률을 알려주고, 피싱이면 링크를 누르지 말고 삭제하라는 등 권장 조치를 함께 안내해줘.";

const PHISHING_EXPLAIN_ERROR: &str = "피싱 검사 중 오류가 발생했어. 오류 내용을 간단히 설명하고 \
잠시 후 다시 시도하거나 모델 파일 설정을 확인하라고 친절하게 안내해줘.";

const EMPTY_REPLY: &str = "요청을 처리했습니다.";

/// Canned prompts behind the quick-action buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickAction {
    SummarizeRecent,
    CheckFirstMail,
    Statistics,
    LinkRisk,
    DeepAnalysis,
}

impl QuickAction {
    pub fn prompt(self) -> &'static str {
        match self {
            QuickAction::SummarizeRecent => "최근 메일 5개를 요약해줘",
            QuickAction::CheckFirstMail => "1번 메일이 피싱인지 확인해줘",
            QuickAction::Statistics => "최근 메일 통계를 보여줘",
            QuickAction::LinkRisk => "최근 메일 5개의 링크 위험도를 분석해줘",
            QuickAction::DeepAnalysis => "1번 메일을 웹 검색까지 활용해서 심층 분석해줘",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub response: String,
    /// Name of the operation the model chose, if any.
    pub operation: Option<String>,
    pub mailbox_changed: bool,
}

/// One chat turn: tool selection, dispatch, then a phrasing call with tools
/// disabled. LLM failures become the fixed user-facing messages.
pub async fn process_chat(ctx: &mut CommandContext<'_>, user_input: &str) -> ChatTurn {
    let turn = match route(ctx, user_input).await {
        Ok(turn) => turn,
        Err(e) => ChatTurn {
            response: e.user_message(),
            operation: None,
            mailbox_changed: false,
        },
    };
    ctx.session.record_turn(user_input, &turn.response);
    turn
}

async fn route(ctx: &mut CommandContext<'_>, user_input: &str) -> Result<ChatTurn, LlmError> {
    let listing = format_summaries(&ctx.session.mailbox.messages());
    let mut messages = vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::system(format!("현재 메일 목록:\n{}", listing)),
        ChatMessage::user(user_input),
    ];
    let tools = tool_definitions(&[]);

    let first = ctx
        .llm
        .chat(ChatRequest {
            messages: messages.clone(),
            tools: tools.clone(),
            tool_choice: ToolChoice::Auto,
        })
        .await?;

    let call = match first.tool_calls.first() {
        Some(call) => call.clone(),
        None => {
            return Ok(ChatTurn {
                response: first.content_or_empty(),
                operation: None,
                mailbox_changed: false,
            })
        }
    };
    if first.tool_calls.len() > 1 {
        debug!("Ignoring {} extra tool calls", first.tool_calls.len() - 1);
    }
    info!("Model selected {} with {}", call.function.name, call.function.arguments);

    let result = run_call(ctx, &call).await;

    messages.push(ChatMessage::assistant_tool_calls(first.content.clone(), vec![call.clone()]));
    messages.push(ChatMessage::tool(call.id.clone(), result.to_json().to_string()));
    if call.function.name == OperationKind::CheckPhishing.name() {
        let steer = if result.is_error() {
            PHISHING_EXPLAIN_ERROR
        } else {
            PHISHING_EXPLAIN
        };
        messages.push(ChatMessage::user(steer));
    }

    let last = ctx
        .llm
        .chat(ChatRequest {
            messages,
            tools,
            tool_choice: ToolChoice::None,
        })
        .await?;

    let response = last.content_or_empty();
    Ok(ChatTurn {
        response: if response.trim().is_empty() {
            EMPTY_REPLY.to_string()
        } else {
            response
        },
        operation: Some(call.function.name),
        mailbox_changed: result.changed_mailbox(),
    })
}

/// `agent_analysis` goes through the agent loop; everything else is a single
/// registry call.
async fn run_call(ctx: &mut CommandContext<'_>, call: &ToolCall) -> CommandResult {
    match command_service::parse_call(&call.function.name, &call.function.arguments) {
        Ok(Operation::AgentAnalysis { index }) => agent_service::agent_analysis(ctx, index).await.into(),
        Ok(op) => command_service::execute(ctx, op).await,
        Err(e) => CommandResult::error(&e),
    }
}
