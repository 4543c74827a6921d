use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD}, Engine as _};
use log::{debug, error, info, warn};
use oauth2::TokenResponse;
use rand::Rng;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::email::{MessageSummary, NO_SENDER, NO_SUBJECT};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limited by the mail provider")]
    RateLimited,

    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Mail provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Unable to decode message: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Fixed text shown to the user instead of the raw error.
    pub fn user_message(&self) -> String {
        match self {
            ProviderError::Auth(_) => "❌ Gmail 인증이 필요합니다. 다시 로그인해주세요.".to_string(),
            ProviderError::RateLimited => "⚠️ 요청이 너무 많습니다. 잠시 후 다시 시도해주세요.".to_string(),
            ProviderError::NotFound(_) => "❌ 메일을 찾을 수 없습니다. 이미 삭제되었을 수 있습니다.".to_string(),
            ProviderError::PermissionDenied(_) => "❌ 메일 삭제 권한이 없습니다.".to_string(),
            other => format!("❌ 메일 서비스 오류: {}", other),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ProviderError::Decode(error.to_string())
        } else {
            ProviderError::Connection(error.to_string())
        }
    }
}

/// The mail operations the assistant needs from Gmail.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Summaries of up to `max_results` messages, newest first.
    async fn list_messages(&self, max_results: usize) -> Result<Vec<MessageSummary>, ProviderError>;

    /// The RFC 822 bytes of one message.
    async fn get_raw_message(&self, message_id: &str) -> Result<Vec<u8>, ProviderError>;

    async fn trash_message(&self, message_id: &str) -> Result<(), ProviderError>;

    /// The authenticated account's address; doubles as an auth check.
    async fn profile(&self) -> Result<String, ProviderError>;
}

#[derive(Serialize, Deserialize)]
pub struct TokenCache {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Reads the access token from the cache file.
pub fn read_access_token(token_file: &Path) -> Result<String, ProviderError> {
    let file_content = fs::read_to_string(token_file)
        .map_err(|e| ProviderError::Auth(format!("{}: {}", token_file.display(), e)))?;
    let token_cache: TokenCache = serde_json::from_str(&file_content)
        .map_err(|e| ProviderError::Auth(format!("invalid token cache: {}", e)))?;
    Ok(token_cache.access_token)
}

/// Refreshes the OAuth token and rewrites the cache file.
///
/// Google omits the refresh token from refresh responses, so the previous one
/// is carried over into the new cache entry.
pub async fn refresh_token(
    oauth_client: &oauth2::basic::BasicClient,
    token_file: &Path,
) -> Result<String, ProviderError> {
    let file_content = fs::read_to_string(token_file)
        .map_err(|e| ProviderError::Auth(e.to_string()))?;
    let token_cache: TokenCache = serde_json::from_str(&file_content)
        .map_err(|e| ProviderError::Auth(e.to_string()))?;

    let current_refresh_token = match token_cache.refresh_token {
        Some(rt) => rt,
        None => return Err(ProviderError::Auth("No refresh token available. Please re-authenticate.".into())),
    };

    let new_token = oauth_client
        .exchange_refresh_token(&oauth2::RefreshToken::new(current_refresh_token.clone()))
        .request_async(oauth2::reqwest::async_http_client)
        .await
        .map_err(|e| ProviderError::Auth(e.to_string()))?;

    let refreshed = TokenCache {
        access_token: new_token.access_token().secret().to_string(),
        token_type: Some("Bearer".to_string()),
        expires_in: new_token.expires_in().map(|d| d.as_secs()),
        refresh_token: Some(
            new_token
                .refresh_token()
                .map(|rt| rt.secret().to_string())
                .unwrap_or(current_refresh_token),
        ),
        scope: token_cache.scope,
    };
    let token_json = serde_json::to_string(&refreshed)
        .map_err(|e| ProviderError::Decode(e.to_string()))?;
    fs::write(token_file, token_json).map_err(|e| ProviderError::Auth(e.to_string()))?;
    info!("Token successfully refreshed.");

    Ok(refreshed.access_token)
}

/// Jittered exponential backoff for HTTP 429 responses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// `base * uniform(0.5, 1.5) * 2^attempt`. Attempts count from the first
    /// call, so the first retry is attempt 1.
    fn delay_for(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
        self.base_delay.mul_f64(jitter * 2f64.powi(attempt as i32))
    }
}

/// Runs `op`, retrying only while the provider answers with a rate limit.
pub async fn with_rate_limit_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(ProviderError::RateLimited) if attempt + 1 < policy.max_attempts => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!(
                    "Rate limited, retrying in {:?} ({}/{})",
                    delay, attempt, policy.max_attempts
                );
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

enum Credentials {
    TokenFile(PathBuf),
    Static(String),
}

/// Gmail REST v1 client.
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl GmailClient {
    /// Client that reads the bearer token from the OAuth token cache on every call.
    pub fn new(base_url: &str, token_file: PathBuf) -> Result<Self, ProviderError> {
        Self::build(base_url, Credentials::TokenFile(token_file))
    }

    pub fn with_access_token(base_url: &str, access_token: &str) -> Result<Self, ProviderError> {
        Self::build(base_url, Credentials::Static(access_token.to_string()))
    }

    fn build(base_url: &str, credentials: Credentials) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(GmailClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn access_token(&self) -> Result<String, ProviderError> {
        match &self.credentials {
            Credentials::TokenFile(path) => read_access_token(path),
            Credentials::Static(token) => Ok(token.clone()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/users/me/{}", self.base_url, path)
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ProviderError> {
        let access_token = self.access_token()?;
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .bearer_auth(&access_token)
            .send()
            .await?;
        read_json(response).await
    }

    async fn fetch_summary(&self, message_id: &str) -> Result<MessageSummary, ProviderError> {
        let query = [
            ("format", "metadata".to_string()),
            ("metadataHeaders", "Subject".to_string()),
            ("metadataHeaders", "From".to_string()),
            ("metadataHeaders", "Date".to_string()),
        ];
        let message = self.get_json(&format!("messages/{}", message_id), &query).await?;
        let headers: &[Value] = message["payload"]["headers"]
            .as_array()
            .map(|arr| &arr[..])
            .unwrap_or(&[]);

        Ok(MessageSummary {
            id: message["id"].as_str().unwrap_or(message_id).to_string(),
            subject: get_header(headers, "Subject").unwrap_or_else(|| NO_SUBJECT.to_string()),
            sender: get_header(headers, "From").unwrap_or_else(|| NO_SENDER.to_string()),
            snippet: message["snippet"].as_str().unwrap_or_default().to_string(),
            date: get_header(headers, "Date"),
        })
    }
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn list_messages(&self, max_results: usize) -> Result<Vec<MessageSummary>, ProviderError> {
        info!("Fetching up to {} messages from Gmail API...", max_results);
        let listing = self
            .get_json("messages", &[("maxResults", max_results.to_string())])
            .await?;

        let message_ids: Vec<String> = listing["messages"]
            .as_array()
            .map(|arr| arr.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(|m| m.get("id").and_then(|id| id.as_str()).map(|s| s.to_string()))
            .collect();

        let mut summaries = Vec::with_capacity(message_ids.len());
        for message_id in message_ids.iter() {
            debug!("Fetching message details for ID: {}", message_id);
            match self.fetch_summary(message_id).await {
                Ok(summary) => summaries.push(summary),
                Err(ProviderError::Auth(e)) => return Err(ProviderError::Auth(e)),
                Err(e) => warn!("Skipping message {}: {}", message_id, e),
            }
        }
        info!("Fetched {} message summaries", summaries.len());
        Ok(summaries)
    }

    async fn get_raw_message(&self, message_id: &str) -> Result<Vec<u8>, ProviderError> {
        let message = self
            .get_json(&format!("messages/{}", message_id), &[("format", "raw".to_string())])
            .await?;
        let raw = message["raw"]
            .as_str()
            .ok_or_else(|| ProviderError::Decode(format!("message {} has no raw payload", message_id)))?;
        decode_base64url(raw)
    }

    async fn trash_message(&self, message_id: &str) -> Result<(), ProviderError> {
        let access_token = self.access_token()?;
        let response = self
            .http
            .post(self.url(&format!("messages/{}/trash", message_id)))
            .bearer_auth(&access_token)
            .send()
            .await?;
        let body = read_json(response).await?;
        if body.get("id").is_some() {
            info!("Moved message {} to trash", message_id);
            Ok(())
        } else {
            error!("Trash response for {} carried no id", message_id);
            Err(ProviderError::Decode("trash response carried no message id".to_string()))
        }
    }

    async fn profile(&self) -> Result<String, ProviderError> {
        let profile = self.get_json("profile", &[]).await?;
        Ok(profile["emailAddress"].as_str().unwrap_or_default().to_string())
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string());
    match status {
        StatusCode::UNAUTHORIZED => ProviderError::Auth(message),
        StatusCode::FORBIDDEN => ProviderError::PermissionDenied(message),
        StatusCode::NOT_FOUND => ProviderError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        other => ProviderError::Api {
            status: other.as_u16(),
            message,
        },
    }
}

/// Gmail emits URL-safe base64, sometimes without padding.
pub fn decode_base64url(data: &str) -> Result<Vec<u8>, ProviderError> {
    let trimmed = data.trim();
    URL_SAFE
        .decode(trimmed)
        .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed.trim_end_matches('=')))
        .map_err(|e| ProviderError::Decode(e.to_string()))
}

/// Helper: find a header value (case insensitive) from a slice of headers.
fn get_header(headers: &[Value], name: &str) -> Option<String> {
    headers.iter().find(|h| {
        h.get("name")
            .and_then(|n| n.as_str())
            .map(|n| n.eq_ignore_ascii_case(name))
            .unwrap_or(false)
    })
        .and_then(|h| h.get("value").and_then(|v| v.as_str()).map(String::from))
}
