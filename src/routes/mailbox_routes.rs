use actix_session::Session;
use actix_web::{get, web, Responder};

use crate::handlers::mailbox_handler::{self, PageQuery};
use crate::routes::app_state::AppState;

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list_mails).service(get_mail);
}

#[get("/mails")]
async fn list_mails(data: web::Data<AppState>, session: Session, query: web::Query<PageQuery>) -> impl Responder {
    mailbox_handler::list_mails(data, session, query).await
}

#[get("/mails/{number}")]
async fn get_mail(data: web::Data<AppState>, session: Session, number: web::Path<usize>) -> impl Responder {
    mailbox_handler::get_mail(data, session, number).await
}
