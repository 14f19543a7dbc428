use axum::{
    Router,
    routing::get,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::db::repositories::settings;
use crate::state::AppState;

pub mod admin;
pub mod auth;
mod error;
pub mod pages;
pub mod session;
pub mod templates;

pub use error::WebError;
pub use session::ForumSession;

/// Shared page furniture: forum name, the (consumed) flash message, nav, and
/// the footer-link strip. Built once per render.
pub struct Chrome {
    pub forum_name: String,
    pub msg: String,
    pub usernav: String,
    pub footer: String,
}

pub async fn chrome(
    state: &Arc<AppState>,
    sess: &ForumSession,
    current_url: &str,
) -> Result<Chrome, WebError> {
    let forum_name = state.store.read_setting(settings::FORUM_NAME).await?;
    let msg = sess.flash_msg().await?;
    let user_name = sess.user_name().await?;
    let notes = state.store.list_notes().await?;

    Ok(Chrome {
        forum_name,
        msg,
        usernav: templates::usernav_html(user_name.as_deref(), current_url),
        footer: templates::footer_html(&notes),
    })
}

pub async fn router(state: Arc<AppState>) -> Router {
    let session_ttl = state.config.read().await.security.session_ttl_minutes;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(session_ttl)));

    Router::new()
        .route("/", get(pages::index))
        .route("/note", get(pages::note))
        .route("/favicon.ico", get(pages::favicon))
        .route("/signup", get(auth::signup_form).post(auth::signup_submit))
        .route("/login", get(auth::login_form).post(auth::login_submit))
        .route("/logout", get(auth::logout))
        .route(
            "/changepass",
            get(auth::changepass_form).post(auth::changepass_submit),
        )
        .route(
            "/forgotpass",
            get(auth::forgotpass_form).post(auth::forgotpass_submit),
        )
        .route(
            "/resetpass",
            get(auth::resetpass_form).post(auth::resetpass_submit),
        )
        .route(
            "/creategroup",
            get(pages::creategroup_form).post(pages::creategroup_submit),
        )
        .route("/admin", get(admin::admin_page).post(admin::admin_submit))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
