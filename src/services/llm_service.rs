use async_trait::async_trait;
use log::{debug, error};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments as produced by the model.
    pub arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        ToolCall {
            id: id.into(),
            kind: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: Role, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        ChatMessage {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

impl ToolDefinition {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        ToolDefinition {
            kind: function_type(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
}

impl ChatRequest {
    /// A request that only asks for text.
    pub fn plain(messages: Vec<ChatMessage>) -> Self {
        ChatRequest {
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatReply {
    pub fn text(content: impl Into<String>) -> Self {
        ChatReply {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        ChatReply {
            content: None,
            tool_calls,
        }
    }

    pub fn content_or_empty(&self) -> String {
        self.content.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("Invalid API key: OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Http(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Fixed user-facing text, chosen by keywords in the error message.
    pub fn user_message(&self) -> String {
        let text = self.to_string();
        let lowered = text.to_lowercase();
        if lowered.contains("authentication") || lowered.contains("invalid") {
            "❌ OpenAI API 키가 유효하지 않습니다. API 키를 확인해주세요.".to_string()
        } else if lowered.contains("rate limit") {
            "⏳ 요청이 너무 많습니다. 잠시 후 다시 시도해주세요.".to_string()
        } else if lowered.contains("quota") {
            "💳 API 사용량 한도를 초과했습니다. 요금제를 확인해주세요.".to_string()
        } else {
            format!("❌ 오류가 발생했습니다: {}", text)
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        LlmError::Http(error.to_string())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One chat-completions round. The reply carries either text or tool calls.
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, LlmError>;

    /// Free-text answer from a model with web search enabled.
    async fn web_search(&self, prompt: String) -> Result<String, LlmError>;
}

/// Sends a single user prompt and returns the text of the answer.
pub async fn complete(llm: &dyn LlmClient, prompt: String) -> Result<String, LlmError> {
    let reply = llm.chat(ChatRequest::plain(vec![ChatMessage::user(prompt)])).await?;
    Ok(reply.content_or_empty().trim().to_string())
}

/// Client for an OpenAI-compatible API (`/chat/completions`, `/responses`).
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    search_model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChatReply,
}

impl OpenAiClient {
    pub fn from_settings(settings: &Settings) -> Self {
        OpenAiClient {
            http: reqwest::Client::new(),
            base_url: settings.openai_base_url.trim_end_matches('/').to_string(),
            api_key: settings.openai_api_key.clone(),
            model: settings.model.clone(),
            search_model: settings.search_model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }

    fn api_key(&self) -> Result<&str, LlmError> {
        self.api_key.as_deref().ok_or(LlmError::MissingApiKey)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, LlmError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("POST {}", url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key()?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let err = api_error(status, &text);
            error!("LLM call to {} failed: {}", path, err);
            return Err(err);
        }
        serde_json::from_str(&text).map_err(|e| LlmError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply, LlmError> {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools);
            body["tool_choice"] = json!(request.tool_choice);
        }

        let value = self.post("chat/completions", &body).await?;
        let parsed: CompletionResponse =
            serde_json::from_value(value).map_err(|e| LlmError::Malformed(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| LlmError::Malformed("no choices in response".to_string()))
    }

    async fn web_search(&self, prompt: String) -> Result<String, LlmError> {
        let body = json!({
            "model": self.search_model,
            "tools": [{ "type": "web_search_preview" }],
            "input": prompt,
        });
        let value = self.post("responses", &body).await?;
        extract_output_text(&value).ok_or_else(|| LlmError::Malformed("no output_text in response".to_string()))
    }
}

/// Reads the answer text of a `/responses` payload.
fn extract_output_text(value: &Value) -> Option<String> {
    if let Some(text) = value["output_text"].as_str() {
        return Some(text.to_string());
    }
    let parts: Vec<&str> = value["output"]
        .as_array()?
        .iter()
        .filter_map(|item| item["content"].as_array())
        .flatten()
        .filter(|part| part["type"] == "output_text")
        .filter_map(|part| part["text"].as_str())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

fn api_error(status: StatusCode, body: &str) -> LlmError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().map(|v| &v["error"]);
    let message = error
        .and_then(|e| e["message"].as_str())
        .unwrap_or(body)
        .to_string();
    let message = match error.and_then(|e| e["code"].as_str()) {
        Some(code) => format!("{} ({})", message, code),
        None => message,
    };
    let message = if status == StatusCode::TOO_MANY_REQUESTS && !message.to_lowercase().contains("quota") {
        format!("rate limit reached: {}", message)
    } else if status == StatusCode::UNAUTHORIZED {
        format!("authentication failed: {}", message)
    } else {
        message
    };
    LlmError::Api {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_classification() {
        let invalid = LlmError::Api {
            status: 401,
            message: "authentication failed: Incorrect API key provided (invalid_api_key)".into(),
        };
        assert!(invalid.user_message().contains("API 키"));
        assert!(LlmError::MissingApiKey.user_message().contains("API 키"));

        let limited = api_error(StatusCode::TOO_MANY_REQUESTS, r#"{"error":{"message":"slow down"}}"#);
        assert!(limited.user_message().contains("요청이 너무 많습니다"));

        let quota = api_error(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"You exceeded your current quota","code":"insufficient_quota"}}"#,
        );
        assert!(quota.user_message().contains("한도"));

        let other = LlmError::Http("connection reset".into());
        assert_eq!(other.user_message(), "❌ 오류가 발생했습니다: request failed: connection reset");
    }

    #[test]
    fn test_tool_message_serialization() {
        let msg = ChatMessage::assistant_tool_calls(None, vec![ToolCall::new("call_1", "get_mail_content", "{\"index\":0}")]);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert!(json["content"].is_null());
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "get_mail_content");

        let tool = serde_json::to_value(ChatMessage::tool("call_1", "{}")).unwrap();
        assert_eq!(tool["tool_call_id"], "call_1");
        assert!(tool.get("tool_calls").is_none());
    }

    #[test]
    fn test_extract_output_text_from_message_items() {
        let value = json!({
            "output": [
                {"type": "web_search_call", "status": "completed"},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "안전한 도메인입니다."}
                ]}
            ]
        });
        assert_eq!(extract_output_text(&value).as_deref(), Some("안전한 도메인입니다."));
        assert_eq!(extract_output_text(&json!({"output_text": "x"})).as_deref(), Some("x"));
        assert!(extract_output_text(&json!({})).is_none());
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let client = OpenAiClient::from_settings(&Settings::default());
        let err = client.chat(ChatRequest::plain(vec![ChatMessage::user("hi")])).await.unwrap_err();
        assert_eq!(err, LlmError::MissingApiKey);
    }
}
