//! Superadmin page: forum settings and footer-link management.
//!
//! Both forms POST to /admin, distinguished by the `linkid` field: absent
//! means the settings form, "new" creates a footer link, anything else
//! edits or deletes the link with that id.

use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum::Form;
use serde::Deserialize;
use std::sync::Arc;

use crate::db::ExtraNote;
use crate::db::repositories::settings;
use crate::state::AppState;
use crate::web::chrome;
use crate::web::error::WebError;
use crate::web::session::ForumSession;
use crate::web::templates::Page;

pub async fn admin_page(
    State(state): State<Arc<AppState>>,
    sess: ForumSession,
) -> Result<Response, WebError> {
    if !sess.is_user_super_admin(&state.store).await? {
        return Err(WebError::Forbidden);
    }

    let all = state.store.all_settings().await?;
    let get = |name: &str| all.get(name).cloned().unwrap_or_default();
    let checked = |name: &str| if get(name) == "1" { "checked" } else { "" };

    let notes = state.store.list_notes().await?;
    let num_users = state.store.count_users().await?;

    let chrome = chrome(&state, &sess, "/admin").await?;
    Ok(Page::new("adminindex.html")
        .var("title", "Administration")
        .var("forum_name", chrome.forum_name)
        .var("msg", chrome.msg)
        .var("csrf", sess.csrf_token())
        .var("forum_name_value", get(settings::FORUM_NAME))
        .var("header_msg_value", get(settings::HEADER_MSG))
        .var("signup_disabled_checked", checked(settings::SIGNUP_DISABLED))
        .var(
            "group_creation_disabled_checked",
            checked(settings::GROUP_CREATION_DISABLED),
        )
        .var("num_users", num_users.to_string())
        .raw("notes_rows", notes_rows_html(&notes, sess.csrf_token()))
        .raw("usernav", chrome.usernav)
        .raw("footer", chrome.footer)
        .render()?
        .into_response())
}

/// One edit form per existing footer link.
fn notes_rows_html(notes: &[ExtraNote], csrf: &str) -> String {
    let mut out = String::new();
    for note in notes {
        out.push_str(&format!(
            concat!(
                "<form method=\"POST\" action=\"/admin\">",
                "<input type=\"hidden\" name=\"csrf\" value=\"{csrf}\">",
                "<input type=\"hidden\" name=\"linkid\" value=\"{id}\">",
                "<label>Name <input type=\"text\" name=\"name\" value=\"{name}\"></label> ",
                "<label>External URL <input type=\"text\" name=\"url\" value=\"{url}\"></label> ",
                "<label>Content <textarea name=\"content\">{content}</textarea></label> ",
                "<input type=\"submit\" name=\"submit\" value=\"Save\"> ",
                "<input type=\"submit\" name=\"submit\" value=\"Delete\">",
                "</form>\n",
            ),
            csrf = html_escape::encode_double_quoted_attribute(csrf),
            id = note.id,
            name = html_escape::encode_double_quoted_attribute(&note.name),
            url = html_escape::encode_double_quoted_attribute(&note.url),
            content = html_escape::encode_text(&note.content),
        ));
    }
    out
}

#[derive(Deserialize)]
pub struct AdminForm {
    #[serde(default)]
    pub csrf: String,
    #[serde(default)]
    pub linkid: Option<String>,

    // Settings form fields.
    #[serde(default)]
    pub forum_name: String,
    #[serde(default)]
    pub header_msg: String,
    #[serde(default)]
    pub signup_disabled: Option<String>,
    #[serde(default)]
    pub group_creation_disabled: Option<String>,

    // Footer-link form fields.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub submit: String,
}

pub async fn admin_submit(
    State(state): State<Arc<AppState>>,
    sess: ForumSession,
    Form(form): Form<AdminForm>,
) -> Result<Response, WebError> {
    sess.verify_csrf(&form.csrf)?;

    if !sess.is_user_super_admin(&state.store).await? {
        return Err(WebError::Forbidden);
    }

    match form.linkid.as_deref() {
        None | Some("") => save_settings(&state, &sess, &form).await?,
        Some("new") => {
            if !form.name.is_empty() && (!form.url.is_empty() || !form.content.is_empty()) {
                state
                    .store
                    .create_note(&form.name, &form.url, &form.content)
                    .await?;
            } else {
                sess.set_flash_msg(
                    "Enter an external URL or type some content for the footer link.",
                )
                .await?;
            }
        }
        Some(id) => {
            let id: i32 = id.parse().map_err(|_| WebError::NotFound)?;
            if form.submit == "Delete" {
                state.store.delete_note(id).await?;
            } else {
                state
                    .store
                    .update_note(id, &form.name, &form.url, &form.content)
                    .await?;
            }
        }
    }

    Ok(Redirect::to("/admin").into_response())
}

async fn save_settings(
    state: &Arc<AppState>,
    sess: &ForumSession,
    form: &AdminForm,
) -> Result<(), WebError> {
    if form.forum_name.is_empty() {
        sess.set_flash_msg("Forum name is empty.").await?;
        return Ok(());
    }

    let flag = |v: &Option<String>| if v.is_some() { "1" } else { "0" };

    let store = &state.store;
    store.write_setting(settings::FORUM_NAME, &form.forum_name).await?;
    store.write_setting(settings::HEADER_MSG, &form.header_msg).await?;
    store
        .write_setting(settings::SIGNUP_DISABLED, flag(&form.signup_disabled))
        .await?;
    store
        .write_setting(
            settings::GROUP_CREATION_DISABLED,
            flag(&form.group_creation_disabled),
        )
        .await?;

    Ok(())
}
