use actix_web::{get, web, Responder};

use crate::handlers::oauth_handler::{self, CallbackQuery};
use crate::routes::app_state::AppState;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(check_auth)
        .service(oauth_login)
        .service(oauth_callback);
}

#[get("/check_auth")]
async fn check_auth(data: web::Data<AppState>) -> impl Responder {
    oauth_handler::check_auth(data).await
}

#[get("/oauth/login")]
async fn oauth_login(data: web::Data<AppState>) -> impl Responder {
    oauth_handler::oauth_login(data).await
}

#[get("/oauth/callback")]
async fn oauth_callback(data: web::Data<AppState>, query: web::Query<CallbackQuery>) -> impl Responder {
    oauth_handler::oauth_callback(data, query).await
}
