use actix_session::Session;
use actix_web::{web, HttpResponse};
use log::info;
use serde::Deserialize;
use serde_json::json;

use crate::handlers::session_handler::{current_session_id, session_missing};
use crate::routes::app_state::AppState;
use crate::services::chat_service::{self, QuickAction};
use crate::services::command_service::CommandContext;

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct QuickActionBody {
    pub action: QuickAction,
}

async fn run_turn(data: &AppState, session_id: String, user_input: &str) -> HttpResponse {
    let Some(mut user_session) = data.session_manager.get(&session_id) else {
        return session_missing();
    };
    info!("Processing message for session {}: {}", session_id, user_input);

    let turn = {
        let mut ctx = CommandContext {
            session: &mut user_session,
            provider: data.provider.as_ref(),
            llm: data.llm.as_ref(),
            scorer: data.scorer.as_ref(),
        };
        chat_service::process_chat(&mut ctx, user_input).await
    };
    data.session_manager.insert(session_id, user_session);
    HttpResponse::Ok().json(turn)
}

pub async fn handle_chat_request(data: web::Data<AppState>, session: Session, body: web::Json<ChatBody>) -> HttpResponse {
    let Some(session_id) = current_session_id(&session) else {
        return session_missing();
    };
    if body.message.trim().is_empty() {
        return HttpResponse::BadRequest().json(json!({ "error": "message is empty" }));
    }
    run_turn(&data, session_id, &body.message).await
}

pub async fn handle_quick_action(
    data: web::Data<AppState>,
    session: Session,
    body: web::Json<QuickActionBody>,
) -> HttpResponse {
    let Some(session_id) = current_session_id(&session) else {
        return session_missing();
    };
    run_turn(&data, session_id, body.action.prompt()).await
}

pub async fn chat_history(data: web::Data<AppState>, session: Session) -> HttpResponse {
    match current_session_id(&session).and_then(|id| data.session_manager.get(&id)) {
        Some(user_session) => HttpResponse::Ok().json(json!({ "history": user_session.history })),
        None => session_missing(),
    }
}
