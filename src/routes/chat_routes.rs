use actix_session::Session;
use actix_web::{get, post, web, Responder};

use crate::handlers::chat_handler::{self, ChatBody, QuickActionBody};
use crate::routes::app_state::AppState;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(chat).service(quick_action).service(history);
}

#[post("/chat")]
async fn chat(data: web::Data<AppState>, session: Session, body: web::Json<ChatBody>) -> impl Responder {
    chat_handler::handle_chat_request(data, session, body).await
}

#[post("/quick_action")]
async fn quick_action(data: web::Data<AppState>, session: Session, body: web::Json<QuickActionBody>) -> impl Responder {
    chat_handler::handle_quick_action(data, session, body).await
}

#[get("/history")]
async fn history(data: web::Data<AppState>, session: Session) -> impl Responder {
    chat_handler::chat_history(data, session).await
}
