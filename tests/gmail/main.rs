use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use deepmail::services::gmail_service::{GmailClient, MailProvider, ProviderError};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn client_for(server: &MockServer) -> GmailClient {
    GmailClient::with_access_token(&format!("{}/gmail/v1", server.uri()), "test-token").unwrap()
}

#[tokio::test]
async fn test_list_messages_reads_metadata_headers() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages"))
        .and(query_param("maxResults", "30"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{"id": "m1"}, {"id": "m2"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages/m1"))
        .and(query_param("format", "metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "m1",
            "snippet": "Your invoice is attached",
            "payload": {"headers": [
                {"name": "Subject", "value": "Invoice 42"},
                {"name": "From", "value": "Billing <billing@example.com>"},
                {"name": "Date", "value": "Mon, 2 Jun 2025 10:00:00 +0900"}
            ]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages/m2"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"message": "Requested entity was not found."}
        })))
        .mount(&server)
        .await;

    let messages = client_for(&server).list_messages(30).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].subject, "Invoice 42");
    assert_eq!(messages[0].sender, "Billing <billing@example.com>");
    assert_eq!(messages[0].snippet, "Your invoice is attached");
    assert!(messages[0].date.is_some());
}

#[tokio::test]
async fn test_unauthorized_listing_is_auth_error() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Invalid Credentials"}
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).list_messages(5).await.unwrap_err();
    assert!(matches!(err, ProviderError::Auth(ref m) if m == "Invalid Credentials"));
}

#[tokio::test]
async fn test_get_raw_message_decodes_base64url() {
    init_logging();
    let server = MockServer::start().await;
    let raw = "Subject: hi\r\n\r\nbody?>\r\n";
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages/m1"))
        .and(query_param("format", "raw"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "m1",
            "raw": URL_SAFE_NO_PAD.encode(raw)
        })))
        .mount(&server)
        .await;

    let bytes = client_for(&server).get_raw_message("m1").await.unwrap();
    assert_eq!(bytes, raw.as_bytes());
}

#[tokio::test]
async fn test_trash_message_posts_to_trash_endpoint() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gmail/v1/users/me/messages/m1/trash"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m1", "labelIds": ["TRASH"]})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/gmail/v1/users/me/messages/gone/trash"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": {"message": "Not Found"}})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.trash_message("m1").await.unwrap();
    let err = client.trash_message("gone").await.unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)));
    assert!(err.user_message().contains("삭제"));
}

#[tokio::test]
async fn test_rate_limit_maps_to_rate_limited() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/profile"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = client_for(&server).profile().await.unwrap_err();
    assert!(matches!(err, ProviderError::RateLimited));
}

#[tokio::test]
async fn test_profile_reads_email_address() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"emailAddress": "me@example.com"})))
        .mount(&server)
        .await;

    assert_eq!(client_for(&server).profile().await.unwrap(), "me@example.com");
}
