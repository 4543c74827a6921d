use actix_session::Session;
use actix_web::{web, HttpResponse};
use log::{error, info, warn};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::DEFAULT_PAGE_SIZE;
use crate::models::user_session::UserSession;
use crate::routes::app_state::AppState;
use crate::services::email_service;

/// Session id from the cookie, if the browser has one.
pub fn current_session_id(session: &Session) -> Option<String> {
    match session.get::<String>("session_id") {
        Ok(id) => id,
        Err(e) => {
            warn!("Unreadable session cookie: {}", e);
            None
        }
    }
}

pub fn session_missing() -> HttpResponse {
    HttpResponse::BadRequest().json(json!({ "error": "Session not initialized" }))
}

/// Creates a session, loads the mailbox into it and stores its id in the cookie.
/// A Gmail failure still yields a session with an empty mailbox.
pub async fn initialize_session(data: web::Data<AppState>, session: Session) -> anyhow::Result<Value> {
    if let Some(existing) = current_session_id(&session) {
        if let Some(user_session) = data.session_manager.get(&existing) {
            return Ok(json!({
                "initialized": true,
                "session_id": existing,
                "total": user_session.mailbox.len()
            }));
        }
    }

    let session_id = Uuid::new_v4().to_string();
    session.insert("session_id", session_id.clone())?;
    info!("Stored session_id {} in cookie", session_id);

    let mut new_session = UserSession::default();
    let loaded = email_service::load_emails(&mut new_session, data.provider.as_ref(), data.settings.max_results).await;
    let total = new_session.mailbox.len();
    data.session_manager.insert(session_id.clone(), new_session);
    info!("Initialized user session {} with {} emails", session_id, total);

    let mut body = json!({ "initialized": true, "session_id": session_id, "total": total });
    if let Err(e) = loaded {
        error!("Initial mailbox load failed for {}: {}", session_id, e);
        body["error"] = json!(e.user_message());
    }
    Ok(body)
}

/// Refetches the mailbox for the current session and returns its first page.
pub async fn refresh_mailbox(data: web::Data<AppState>, session: Session) -> HttpResponse {
    let Some(session_id) = current_session_id(&session) else {
        return session_missing();
    };
    let Some(mut user_session) = data.session_manager.get(&session_id) else {
        return session_missing();
    };

    let loaded = email_service::load_emails(&mut user_session, data.provider.as_ref(), data.settings.max_results).await;
    let page = user_session.mailbox.page(0, DEFAULT_PAGE_SIZE);
    data.session_manager.insert(session_id, user_session);

    match loaded {
        Ok(_) => HttpResponse::Ok().json(page),
        Err(e) => HttpResponse::BadGateway().json(json!({ "error": e.user_message(), "page": page })),
    }
}
