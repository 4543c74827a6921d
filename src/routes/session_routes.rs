use actix_session::Session;
use actix_web::{get, post, web, HttpResponse, Responder};
use log::error;
use serde_json::json;

use crate::handlers::session_handler;
use crate::routes::app_state::AppState;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(init_session).service(refresh);
}

#[get("/init_session")]
async fn init_session(data: web::Data<AppState>, session: Session) -> impl Responder {
    match session_handler::initialize_session(data, session).await {
        Ok(resp) => HttpResponse::Ok().json(resp),
        Err(e) => {
            error!("Error initializing session: {:?}", e);
            HttpResponse::InternalServerError().json(json!({"error": e.to_string()}))
        }
    }
}

#[post("/refresh")]
async fn refresh(data: web::Data<AppState>, session: Session) -> impl Responder {
    session_handler::refresh_mailbox(data, session).await
}
