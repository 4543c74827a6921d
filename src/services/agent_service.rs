use log::{info, warn};
use serde_json::{json, Value};

use crate::config::{AGENT_SYSTEM_PROMPT, MAX_AGENT_STEPS};
use crate::models::command_result::{AnalysisResult, OpError};
use crate::models::operation::{tool_definitions, OperationKind};
use crate::services::command_service::{dispatch, CommandContext};
use crate::services::llm_service::{ChatMessage, ChatRequest, LlmError, ToolCall, ToolChoice, ToolDefinition};

pub const WEB_SEARCH_TOOL: &str = "web_search";

pub const AGENT_GAVE_UP: &str = "분석을 완료하지 못했습니다. 질문을 더 구체적으로 하거나 잠시 후 다시 시도해주세요.";

#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutcome {
    pub answer: String,
    pub steps: usize,
    pub completed: bool,
}

fn web_search_tool() -> ToolDefinition {
    ToolDefinition::function(
        WEB_SEARCH_TOOL,
        "Search the web. Use it to check sender domains, linked sites and known phishing campaigns.",
        json!({
            "type": "object",
            "properties": { "query": { "type": "string", "description": "Search query" } },
            "required": ["query"]
        }),
    )
}

async fn run_web_search(ctx: &CommandContext<'_>, call: &ToolCall) -> String {
    let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
    let query = args["query"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| call.function.arguments.clone());
    match ctx.llm.web_search(query).await {
        Ok(text) => text,
        Err(e) => json!({ "error": e.user_message() }).to_string(),
    }
}

/// Lets the model call mailbox operations and web search until it answers in
/// plain text, for at most `MAX_AGENT_STEPS` rounds.
pub async fn run_agent(ctx: &mut CommandContext<'_>, task: String) -> Result<AgentOutcome, LlmError> {
    let mut tools = tool_definitions(&[OperationKind::AgentAnalysis]);
    tools.push(web_search_tool());
    let mut messages = vec![ChatMessage::system(AGENT_SYSTEM_PROMPT), ChatMessage::user(task)];

    for step in 1..=MAX_AGENT_STEPS {
        let reply = ctx
            .llm
            .chat(ChatRequest {
                messages: messages.clone(),
                tools: tools.clone(),
                tool_choice: ToolChoice::Auto,
            })
            .await?;

        if reply.tool_calls.is_empty() {
            info!("Agent finished after {} step(s)", step);
            return Ok(AgentOutcome {
                answer: reply.content_or_empty(),
                steps: step,
                completed: true,
            });
        }

        messages.push(ChatMessage::assistant_tool_calls(reply.content.clone(), reply.tool_calls.clone()));
        for call in reply.tool_calls {
            info!("Agent step {}: {}", step, call.function.name);
            let output = if call.function.name == WEB_SEARCH_TOOL {
                run_web_search(ctx, &call).await
            } else {
                dispatch(ctx, &call.function.name, &call.function.arguments)
                    .await
                    .to_json()
                    .to_string()
            };
            messages.push(ChatMessage::tool(call.id, output));
        }
    }

    warn!("Agent stopped after {} steps without a final answer", MAX_AGENT_STEPS);
    Ok(AgentOutcome {
        answer: AGENT_GAVE_UP.to_string(),
        steps: MAX_AGENT_STEPS,
        completed: false,
    })
}

/// Security analysis of one mail through the agent loop.
pub async fn agent_analysis(ctx: &mut CommandContext<'_>, index: i64) -> Result<AnalysisResult, OpError> {
    let mailbox = &ctx.session.mailbox;
    let mail = mailbox.get_signed(index).cloned().ok_or(OpError::IndexOutOfRange {
        number: index.saturating_add(1),
        total: mailbox.len(),
    })?;
    let number = index + 1;

    let task = format!(
        "{}번 메일(index {})이 피싱인지 분석해줘.\n제목: {}\n발신자: {}\n미리보기: {}",
        number, index, mail.subject, mail.sender, mail.snippet
    );
    let outcome = run_agent(ctx, task).await.map_err(|e| OpError::Llm(e.user_message()))?;

    Ok(AnalysisResult {
        number: number as usize,
        subject: mail.subject,
        analysis: outcome.answer,
        completed: outcome.completed,
    })
}
