use std::sync::Arc;

use actix_files::Files;
use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::{cookie::Key, middleware::Logger, web, App, HttpServer};
use log::{info, warn};

use deepmail::config::{self, Settings};
use deepmail::global_session_manager::GlobalSessionManager;
use deepmail::routes::{self, app_state::AppState};
use deepmail::services::gmail_service::{GmailClient, MailProvider};
use deepmail::services::llm_service::{LlmClient, OpenAiClient};
use deepmail::services::phishing_service::PhishingScorer;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    config::init_logging();

    let settings = Settings::from_env()?;
    if settings.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; chat requests will fail until it is configured");
    }

    let scorer = PhishingScorer::load(&settings.phishing_model_path);
    if let Err(e) = scorer.ensure_loaded() {
        warn!("Phishing checks are disabled: {}", e);
    }

    let provider: Arc<dyn MailProvider> =
        Arc::new(GmailClient::new(&settings.gmail_api_url, settings.token_cache_file.clone())?);
    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::from_settings(&settings));

    let bind_addr = settings.bind_addr.clone();
    let state = AppState {
        settings: Arc::new(settings),
        provider,
        llm,
        scorer: Arc::new(scorer),
        session_manager: GlobalSessionManager::new(),
    };
    let key = Key::generate();

    info!("Starting server on http://{}", bind_addr);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), key.clone())
                    .cookie_secure(false)
                    .build(),
            )
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
            .service(Files::new("/", "./static").index_file("index.html"))
    })
    .bind(bind_addr)?
    .run()
    .await?;

    Ok(())
}
