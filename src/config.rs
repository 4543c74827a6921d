use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub fn init_logging() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
}

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_SEARCH_MODEL: &str = "gpt-4.1";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;

pub const SYSTEM_PROMPT: &str = "You are DeepMail, an assistant that manages the user's Gmail inbox. \
The user refers to mails by number starting at 1. Mail number N is index N-1 in every function argument. \
Always answer in Korean and refer to mails by their number as the user sees it.";

pub const AGENT_SYSTEM_PROMPT: &str = "You are DeepMail's security analyst. Combine the available mailbox \
functions with web_search to decide whether a mail is phishing. Mail number N is index N-1. \
When you have enough evidence, answer in Korean with a verdict, a risk level and the reasons.";

pub const GMAIL_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
];

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GMAIL_API_URL: &str = "https://gmail.googleapis.com/gmail/v1";
const OAUTH_REDIRECT_URL: &str = "http://localhost:8080/oauth/callback";

/// Upper bound on tool-calling rounds in the agent loop.
pub const MAX_AGENT_STEPS: usize = 8;

pub const DEFAULT_PAGE_SIZE: usize = 5;
pub const PAGE_SIZE_OPTIONS: [usize; 4] = [5, 10, 15, 20];

/// Characters of mail body forwarded to the LLM per mail.
pub const MAX_PROMPT_BODY_CHARS: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Unable to read client secret file {path}: {reason}")]
    ClientSecret { path: String, reason: String },
}

/// Runtime settings, resolved from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
    pub search_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub gmail_api_url: String,
    pub max_results: usize,
    pub phishing_model_path: PathBuf,
    pub client_secret_path: PathBuf,
    pub token_cache_file: PathBuf,
    pub oauth_redirect_url: String,
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            openai_api_key: None,
            openai_base_url: OPENAI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            search_model: DEFAULT_SEARCH_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            gmail_api_url: GMAIL_API_URL.to_string(),
            max_results: 30,
            phishing_model_path: PathBuf::from("models/phishing_model.json"),
            client_secret_path: PathBuf::from("./cfg/client_secret.json"),
            token_cache_file: PathBuf::from("tokencache.json"),
            oauth_redirect_url: OAUTH_REDIRECT_URL.to_string(),
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let defaults = Settings::default();

        Ok(Settings {
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            openai_base_url: env::var("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            model: env::var("OPENAI_MODEL").unwrap_or(defaults.model),
            search_model: env::var("OPENAI_SEARCH_MODEL").unwrap_or(defaults.search_model),
            temperature: parse_var("OPENAI_TEMPERATURE", defaults.temperature)?,
            max_tokens: parse_var("OPENAI_MAX_TOKENS", defaults.max_tokens)?,
            gmail_api_url: env::var("GMAIL_API_URL").unwrap_or(defaults.gmail_api_url),
            max_results: parse_var("GMAIL_MAX_RESULTS", defaults.max_results)?,
            phishing_model_path: env::var("PHISHING_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.phishing_model_path),
            client_secret_path: env::var("CLIENT_SECRET_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.client_secret_path),
            token_cache_file: env::var("TOKEN_CACHE_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.token_cache_file),
            oauth_redirect_url: env::var("OAUTH_REDIRECT_URL").unwrap_or(defaults.oauth_redirect_url),
            bind_addr: env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
        })
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.max_results, 30);
        assert_eq!(settings.max_tokens, 500);
        assert!(settings.openai_api_key.is_none());
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("DEEPMAIL_TEST_MAX", "not-a-number");
        let result: Result<usize, _> = parse_var("DEEPMAIL_TEST_MAX", 3);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        env::remove_var("DEEPMAIL_TEST_MAX");

        let fallback: usize = parse_var("DEEPMAIL_TEST_MISSING", 7).unwrap();
        assert_eq!(fallback, 7);
    }
}
