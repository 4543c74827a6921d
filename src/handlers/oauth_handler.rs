use actix_web::{web, HttpResponse};
use log::{error, info, warn};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope, TokenUrl};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;

use crate::config::{ConfigError, Settings, GMAIL_SCOPES};
use crate::routes::app_state::AppState;
use crate::services::gmail_service::{refresh_token, ProviderError, TokenCache};

fn secret_error(settings: &Settings, reason: impl Into<String>) -> ConfigError {
    ConfigError::ClientSecret {
        path: settings.client_secret_path.display().to_string(),
        reason: reason.into(),
    }
}

/// Constructs an OAuth2 BasicClient from the Google client secret file.
pub fn build_oauth_client(settings: &Settings) -> Result<BasicClient, ConfigError> {
    let secret_str = fs::read_to_string(&settings.client_secret_path).map_err(|e| secret_error(settings, e.to_string()))?;
    let json_secret: Value = serde_json::from_str(&secret_str).map_err(|e| secret_error(settings, e.to_string()))?;
    let installed = if json_secret["installed"].is_object() {
        &json_secret["installed"]
    } else {
        &json_secret["web"]
    };
    let field = |name: &str| -> Result<String, ConfigError> {
        installed[name]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| secret_error(settings, format!("missing {}", name)))
    };

    let auth_url = AuthUrl::new(field("auth_uri")?).map_err(|e| secret_error(settings, e.to_string()))?;
    let token_url = TokenUrl::new(field("token_uri")?).map_err(|e| secret_error(settings, e.to_string()))?;
    let redirect_url = RedirectUrl::new(settings.oauth_redirect_url.clone()).map_err(|e| ConfigError::InvalidValue {
        key: "OAUTH_REDIRECT_URL".to_string(),
        value: e.to_string(),
    })?;

    Ok(BasicClient::new(
        ClientId::new(field("client_id")?),
        Some(ClientSecret::new(field("client_secret")?)),
        auth_url,
        Some(token_url),
    )
    .set_redirect_uri(redirect_url))
}

/// Initiates the OAuth flow by redirecting to Google's consent page.
pub async fn oauth_login(data: web::Data<AppState>) -> HttpResponse {
    let oauth_client = match build_oauth_client(&data.settings) {
        Ok(client) => client,
        Err(e) => {
            error!("OAuth client unavailable: {}", e);
            return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() }));
        }
    };

    let (auth_url, _csrf_token) = oauth_client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(GMAIL_SCOPES.iter().map(|s| Scope::new(s.to_string())))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .url();

    HttpResponse::Found()
        .append_header(("Location", auth_url.to_string()))
        .finish()
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

/// Exchanges the authorization code, writes the token cache and returns to `/`.
pub async fn oauth_callback(data: web::Data<AppState>, query: web::Query<CallbackQuery>) -> HttpResponse {
    if let Some(ref err) = query.error {
        warn!("OAuth consent was not granted: {}", err);
        return HttpResponse::BadRequest().json(json!({ "error": err }));
    }
    let code = match query.code.clone() {
        Some(code) => code,
        None => return HttpResponse::BadRequest().body("Missing code"),
    };

    let oauth_client = match build_oauth_client(&data.settings) {
        Ok(client) => client,
        Err(e) => return HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })),
    };

    let token = match oauth_client
        .exchange_code(AuthorizationCode::new(code))
        .request_async(async_http_client)
        .await
    {
        Ok(token) => token,
        Err(err) => {
            error!("Token exchange error: {:?}", err);
            return HttpResponse::InternalServerError().body(format!("Token exchange error: {}", err));
        }
    };

    let written = serde_json::to_string(&token)
        .map_err(|e| e.to_string())
        .and_then(|json| fs::write(&data.settings.token_cache_file, json).map_err(|e| e.to_string()));
    match written {
        Ok(()) => {
            info!("Token successfully obtained and cached.");
            HttpResponse::Found().append_header(("Location", "/")).finish()
        }
        Err(e) => {
            error!("Unable to write token cache: {}", e);
            HttpResponse::InternalServerError().json(json!({ "error": e }))
        }
    }
}

/// Checks the stored token against Gmail's profile endpoint, refreshing it once
/// when Gmail reports it expired.
pub async fn check_auth(data: web::Data<AppState>) -> HttpResponse {
    let token_file = &data.settings.token_cache_file;
    info!("checking the auth token");
    if !token_file.exists() {
        return HttpResponse::Ok().json(json!({ "authenticated": false }));
    }
    if let Err(e) = fs::read_to_string(token_file)
        .map_err(|e| e.to_string())
        .and_then(|s| serde_json::from_str::<TokenCache>(&s).map_err(|e| e.to_string()))
    {
        error!("Error reading token: {}", e);
        return HttpResponse::Ok().json(json!({ "authenticated": false, "error": e }));
    }

    match data.provider.profile().await {
        Ok(email) => HttpResponse::Ok().json(json!({ "authenticated": true, "email": email })),
        Err(ProviderError::Auth(reason)) => {
            info!("Access token rejected ({}), attempting refresh...", reason);
            let refreshed = match build_oauth_client(&data.settings) {
                Ok(client) => refresh_token(&client, token_file).await,
                Err(e) => Err(ProviderError::Auth(e.to_string())),
            };
            match refreshed {
                Ok(_) => match data.provider.profile().await {
                    Ok(email) => HttpResponse::Ok().json(json!({
                        "authenticated": true,
                        "refreshed": true,
                        "email": email
                    })),
                    Err(e) => HttpResponse::Ok().json(json!({ "authenticated": false, "error": e.user_message() })),
                },
                Err(e) => HttpResponse::Ok().json(json!({ "authenticated": false, "error": e.to_string() })),
            }
        }
        Err(e) => HttpResponse::Ok().json(json!({ "authenticated": false, "error": e.user_message() })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings_with_secret(contents: &str, name: &str) -> Settings {
        let path = std::env::temp_dir().join(name);
        fs::write(&path, contents).unwrap();
        Settings {
            client_secret_path: path,
            ..Settings::default()
        }
    }

    #[test]
    fn test_build_oauth_client_from_installed_secret() {
        let settings = settings_with_secret(
            r#"{"installed": {
                "client_id": "id.apps.googleusercontent.com",
                "client_secret": "shh",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token"
            }}"#,
            "deepmail_secret_ok.json",
        );
        let client = build_oauth_client(&settings).unwrap();
        let (url, _) = client.authorize_url(CsrfToken::new_random).url();
        assert!(url.as_str().contains("client_id=id.apps.googleusercontent.com"));
        assert!(url.as_str().contains("redirect_uri="));
    }

    #[test]
    fn test_build_oauth_client_reports_missing_fields() {
        let settings = settings_with_secret(r#"{"installed": {"client_id": "x"}}"#, "deepmail_secret_bad.json");
        let err = build_oauth_client(&settings).unwrap_err();
        assert!(err.to_string().contains("missing"));

        let missing = Settings {
            client_secret_path: PathBuf::from("/nonexistent/secret.json"),
            ..Settings::default()
        };
        assert!(matches!(build_oauth_client(&missing), Err(ConfigError::ClientSecret { .. })));
    }
}
