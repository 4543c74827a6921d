use actix_session::Session;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::config::DEFAULT_PAGE_SIZE;
use crate::handlers::session_handler::{current_session_id, session_missing};
use crate::routes::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

pub async fn list_mails(data: web::Data<AppState>, session: Session, query: web::Query<PageQuery>) -> HttpResponse {
    let Some(user_session) = current_session_id(&session).and_then(|id| data.session_manager.get(&id)) else {
        return session_missing();
    };
    let page = query.page.unwrap_or(1).saturating_sub(1);
    let mut listing = user_session.mailbox.page(page, query.page_size.unwrap_or(DEFAULT_PAGE_SIZE));
    listing.page += 1;
    HttpResponse::Ok().json(listing)
}

/// Full content of mail `number` (1-based), fetched through the session cache.
pub async fn get_mail(data: web::Data<AppState>, session: Session, number: web::Path<usize>) -> HttpResponse {
    let Some(session_id) = current_session_id(&session) else {
        return session_missing();
    };
    let Some(mut user_session) = data.session_manager.get(&session_id) else {
        return session_missing();
    };

    let number = number.into_inner();
    let Some(mail) = number.checked_sub(1).and_then(|i| user_session.mailbox.get(i)).cloned() else {
        return HttpResponse::NotFound().json(json!({
            "error": format!("{}번 메일이 존재하지 않습니다. (총 {}개 메일)", number, user_session.mailbox.len())
        }));
    };

    let content = user_session
        .contents
        .get_full_content(data.provider.as_ref(), &mail.id)
        .await;
    data.session_manager.insert(session_id, user_session);

    HttpResponse::Ok().json(json!({
        "number": number,
        "id": mail.id,
        "content": content,
        "text": content.readable_text(),
    }))
}
