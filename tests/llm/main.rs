use deepmail::config::Settings;
use deepmail::models::operation::tool_definitions;
use deepmail::services::llm_service::{ChatMessage, ChatRequest, LlmClient, LlmError, OpenAiClient, ToolChoice};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> OpenAiClient {
    OpenAiClient::from_settings(&Settings {
        openai_api_key: Some("sk-test".to_string()),
        openai_base_url: server.uri(),
        ..Settings::default()
    })
}

#[tokio::test]
async fn test_chat_returns_tool_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-4o", "tool_choice": "auto"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "delete_mails_by_indices", "arguments": "{\"indices\":[1]}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client_for(&server)
        .chat(ChatRequest {
            messages: vec![ChatMessage::user("2번 메일 삭제해줘")],
            tools: tool_definitions(&[]),
            tool_choice: ToolChoice::Auto,
        })
        .await
        .unwrap();
    assert!(reply.content.is_none());
    assert_eq!(reply.tool_calls.len(), 1);
    assert_eq!(reply.tool_calls[0].function.name, "delete_mails_by_indices");
    assert_eq!(reply.tool_calls[0].function.arguments, "{\"indices\":[1]}");
}

#[tokio::test]
async fn test_plain_chat_omits_tools() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "요약입니다."}}]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let reply = client
        .chat(ChatRequest::plain(vec![ChatMessage::user("요약해줘")]))
        .await
        .unwrap();
    assert_eq!(reply.content.as_deref(), Some("요약입니다."));

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("tools").is_none());
    assert!(body.get("tool_choice").is_none());
    assert_eq!(body["max_tokens"], 500);
}

#[tokio::test]
async fn test_quota_error_maps_to_quota_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "You exceeded your current quota", "type": "insufficient_quota", "code": "insufficient_quota"}
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .chat(ChatRequest::plain(vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::Api { status: 429, .. }));
    assert!(err.user_message().contains("한도"));
}

#[tokio::test]
async fn test_invalid_key_maps_to_key_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .chat(ChatRequest::plain(vec![ChatMessage::user("hi")]))
        .await
        .unwrap_err();
    assert!(err.user_message().contains("API 키"));
}

#[tokio::test]
async fn test_web_search_uses_responses_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/responses"))
        .and(body_partial_json(json!({
            "model": "gpt-4.1",
            "tools": [{"type": "web_search_preview"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": [
                {"type": "web_search_call", "status": "completed"},
                {"type": "message", "content": [{"type": "output_text", "text": "evil.example.net은 피싱 사이트로 보고되었습니다."}]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = client_for(&server)
        .web_search("evil.example.net 평판".to_string())
        .await
        .unwrap();
    assert!(text.contains("피싱"));
}
