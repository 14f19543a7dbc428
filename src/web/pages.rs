//! Unprivileged pages: the index, footer notes, group creation, favicon.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum::Form;
use serde::Deserialize;
use std::sync::Arc;

use crate::db::repositories::settings;
use crate::state::AppState;
use crate::web::chrome;
use crate::web::error::WebError;
use crate::web::session::ForumSession;
use crate::web::templates::Page;

pub async fn index(
    State(state): State<Arc<AppState>>,
    sess: ForumSession,
) -> Result<Response, WebError> {
    let chrome = chrome(&state, &sess, "/").await?;
    let header_msg = state.store.read_setting(settings::HEADER_MSG).await?;

    Ok(Page::new("index.html")
        .var("title", chrome.forum_name.clone())
        .var("forum_name", chrome.forum_name)
        .var("header_msg", header_msg)
        .var("msg", chrome.msg)
        .raw("usernav", chrome.usernav)
        .raw("footer", chrome.footer)
        .render()?
        .into_response())
}

#[derive(Deserialize)]
pub struct NoteQuery {
    #[serde(default)]
    pub id: Option<i32>,
}

/// Footer note: inline content renders, URL-only notes redirect.
pub async fn note(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NoteQuery>,
    sess: ForumSession,
) -> Result<Response, WebError> {
    let id = query.id.ok_or(WebError::NotFound)?;
    let note = state.store.get_note(id).await?.ok_or(WebError::NotFound)?;

    if !note.url.is_empty() {
        return Ok(Redirect::to(&note.url).into_response());
    }

    let chrome = chrome(&state, &sess, "/note").await?;
    Ok(Page::new("extranote.html")
        .var("title", note.name.clone())
        .var("forum_name", chrome.forum_name)
        .var("msg", chrome.msg)
        .var("note_name", note.name)
        .var("note_content", note.content)
        .raw("usernav", chrome.usernav)
        .raw("footer", chrome.footer)
        .render()?
        .into_response())
}

#[derive(Deserialize)]
pub struct CreateGroupForm {
    #[serde(default)]
    pub csrf: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub desc: String,
}

pub async fn creategroup_form(
    State(state): State<Arc<AppState>>,
    sess: ForumSession,
) -> Result<Response, WebError> {
    if !sess.is_user_valid().await? {
        return Ok(Redirect::to("/login?next=/creategroup").into_response());
    }

    let chrome = chrome(&state, &sess, "/creategroup").await?;
    Ok(Page::new("creategroup.html")
        .var("title", "Create a group")
        .var("forum_name", chrome.forum_name)
        .var("msg", chrome.msg)
        .var("csrf", sess.csrf_token())
        .raw("usernav", chrome.usernav)
        .raw("footer", chrome.footer)
        .render()?
        .into_response())
}

/// Group storage lives outside this subsystem; this handler only validates
/// the name and hands off to the group URL space.
pub async fn creategroup_submit(
    State(state): State<Arc<AppState>>,
    sess: ForumSession,
    Form(form): Form<CreateGroupForm>,
) -> Result<Response, WebError> {
    sess.verify_csrf(&form.csrf)?;

    if !sess.is_user_valid().await? {
        return Ok(Redirect::to("/login?next=/creategroup").into_response());
    }

    if state
        .store
        .read_setting(settings::GROUP_CREATION_DISABLED)
        .await?
        == "1"
    {
        sess.set_flash_msg("Group creation is disabled on this forum.")
            .await?;
        return Ok(Redirect::to("/creategroup").into_response());
    }

    if form.name.is_empty() {
        sess.set_flash_msg("Group name is empty.").await?;
        return Ok(Redirect::to("/creategroup").into_response());
    }

    if !form
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        sess.set_flash_msg("Group name can contain only english alphabets, numbers, and hyphen.")
            .await?;
        return Ok(Redirect::to("/creategroup").into_response());
    }

    Ok(Redirect::to(&format!("/g/{}", form.name)).into_response())
}

pub async fn favicon(State(state): State<Arc<AppState>>) -> Result<Response, WebError> {
    let data_dir = state.config.read().await.general.data_dir.clone();
    if data_dir.is_empty() {
        return Err(WebError::NotFound);
    }

    let path = std::path::Path::new(&data_dir).join("favicon.ico");
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            Ok((
                StatusCode::OK,
                [(axum::http::header::CONTENT_TYPE, mime.to_string())],
                bytes,
            )
                .into_response())
        }
        Err(_) => Err(WebError::NotFound),
    }
}
