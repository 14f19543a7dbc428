//! Signup, login, logout, and the three password flows.
//!
//! Conventions shared by every POST here: the `csrf` field is checked
//! against the session before anything else, validation failures become a
//! flash message plus a redirect back to the form, and only backend trouble
//! escapes as a `WebError`.

use axum::{
    extract::{Query, State},
    http::header::HOST,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use axum::Form;
use serde::Deserialize;
use std::sync::Arc;

use crate::services::AuthError;
use crate::state::AppState;
use crate::web::error::WebError;
use crate::web::session::ForumSession;
use crate::web::templates::Page;
use crate::web::chrome;

#[derive(Deserialize)]
pub struct NextQuery {
    #[serde(default)]
    pub next: Option<String>,
}

/// Clamp redirect targets to local paths so `next` cannot become an open
/// redirect.
fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") => n.to_string(),
        _ => "/".to_string(),
    }
}

/// Flash the message and bounce back to the form, or escalate to the error
/// boundary for non-user-facing failures.
async fn flash_or_fail(
    sess: &ForumSession,
    err: AuthError,
    back_to: &str,
) -> Result<Response, WebError> {
    if err.is_user_facing() {
        sess.set_flash_msg(&err.to_string()).await?;
        Ok(Redirect::to(back_to).into_response())
    } else {
        Err(err.into())
    }
}

// ---- signup ----

#[derive(Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub csrf: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub passwd: String,
    #[serde(default)]
    pub confirm: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub next: Option<String>,
}

pub async fn signup_form(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NextQuery>,
    sess: ForumSession,
) -> Result<Response, WebError> {
    let next = safe_next(query.next.as_deref());
    if sess.is_user_valid().await? {
        return Ok(Redirect::to(&next).into_response());
    }

    let chrome = chrome(&state, &sess, "/signup").await?;
    Ok(Page::new("signup.html")
        .var("title", "Sign up")
        .var("forum_name", chrome.forum_name)
        .var("msg", chrome.msg)
        .var("csrf", sess.csrf_token())
        .var("next", next)
        .raw("usernav", chrome.usernav)
        .raw("footer", chrome.footer)
        .render()?
        .into_response())
}

pub async fn signup_submit(
    State(state): State<Arc<AppState>>,
    sess: ForumSession,
    Form(form): Form<SignupForm>,
) -> Result<Response, WebError> {
    sess.verify_csrf(&form.csrf)?;

    let next = safe_next(form.next.as_deref());
    if sess.is_user_valid().await? {
        return Ok(Redirect::to(&next).into_response());
    }

    match state
        .auth
        .signup(&form.username, &form.passwd, &form.confirm, &form.email)
        .await
    {
        Ok(()) => {
            // Log the fresh account in right away.
            sess.authenticate(state.auth.as_ref(), &form.username, &form.passwd)
                .await?;
            Ok(Redirect::to(&next).into_response())
        }
        Err(e) => flash_or_fail(&sess, e, "/signup").await,
    }
}

// ---- login / logout ----

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub csrf: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub passwd: String,
    #[serde(default)]
    pub next: Option<String>,
}

pub async fn login_form(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NextQuery>,
    sess: ForumSession,
) -> Result<Response, WebError> {
    let next = safe_next(query.next.as_deref());
    if sess.is_user_valid().await? {
        return Ok(Redirect::to(&next).into_response());
    }

    let chrome = chrome(&state, &sess, "/login").await?;
    Ok(Page::new("login.html")
        .var("title", "Log in")
        .var("forum_name", chrome.forum_name)
        .var("msg", chrome.msg)
        .var("csrf", sess.csrf_token())
        .var("next", next)
        .raw("usernav", chrome.usernav)
        .raw("footer", chrome.footer)
        .render()?
        .into_response())
}

pub async fn login_submit(
    State(state): State<Arc<AppState>>,
    sess: ForumSession,
    Form(form): Form<LoginForm>,
) -> Result<Response, WebError> {
    sess.verify_csrf(&form.csrf)?;

    let next = safe_next(form.next.as_deref());
    if sess.is_user_valid().await? {
        return Ok(Redirect::to(&next).into_response());
    }

    if sess
        .authenticate(state.auth.as_ref(), &form.username, &form.passwd)
        .await?
    {
        Ok(Redirect::to(&next).into_response())
    } else {
        sess.set_flash_msg("Incorrect username/password").await?;
        let back = format!("/login?next={}", urlencoding::encode(&next));
        Ok(Redirect::to(&back).into_response())
    }
}

pub async fn logout(sess: ForumSession) -> Result<Response, WebError> {
    sess.clear().await?;
    Ok(Redirect::to("/").into_response())
}

// ---- change password ----

#[derive(Deserialize)]
pub struct ChangePassForm {
    #[serde(default)]
    pub csrf: String,
    #[serde(default)]
    pub passwd: String,
    #[serde(default)]
    pub newpass: String,
    #[serde(default)]
    pub confirm: String,
}

pub async fn changepass_form(
    State(state): State<Arc<AppState>>,
    sess: ForumSession,
) -> Result<Response, WebError> {
    if sess.user_name().await?.is_none() {
        return Ok(Redirect::to("/").into_response());
    }

    let chrome = chrome(&state, &sess, "/changepass").await?;
    Ok(Page::new("changepass.html")
        .var("title", "Change password")
        .var("forum_name", chrome.forum_name)
        .var("msg", chrome.msg)
        .var("csrf", sess.csrf_token())
        .raw("usernav", chrome.usernav)
        .raw("footer", chrome.footer)
        .render()?
        .into_response())
}

pub async fn changepass_submit(
    State(state): State<Arc<AppState>>,
    sess: ForumSession,
    Form(form): Form<ChangePassForm>,
) -> Result<Response, WebError> {
    sess.verify_csrf(&form.csrf)?;

    let Some(username) = sess.user_name().await? else {
        return Ok(Redirect::to("/").into_response());
    };

    match state
        .auth
        .change_password(&username, &form.passwd, &form.newpass, &form.confirm)
        .await
    {
        Ok(()) => {
            sess.set_flash_msg("Password change successful.").await?;
            Ok(Redirect::to("/changepass").into_response())
        }
        Err(e) => flash_or_fail(&sess, e, "/changepass").await,
    }
}

// ---- forgot password ----

#[derive(Deserialize)]
pub struct ForgotPassForm {
    #[serde(default)]
    pub csrf: String,
    #[serde(default)]
    pub username: String,
}

pub async fn forgotpass_form(
    State(state): State<Arc<AppState>>,
    sess: ForumSession,
) -> Result<Response, WebError> {
    let chrome = chrome(&state, &sess, "/forgotpass").await?;
    Ok(Page::new("forgotpass.html")
        .var("title", "Forgot password")
        .var("forum_name", chrome.forum_name)
        .var("msg", chrome.msg)
        .var("csrf", sess.csrf_token())
        .raw("usernav", chrome.usernav)
        .raw("footer", chrome.footer)
        .render()?
        .into_response())
}

pub async fn forgotpass_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    sess: ForumSession,
    Form(form): Form<ForgotPassForm>,
) -> Result<Response, WebError> {
    sess.verify_csrf(&form.csrf)?;

    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost")
        .to_string();

    match state.auth.request_password_reset(&form.username, &host).await {
        Ok(()) => {
            sess.set_flash_msg("Password reset link sent to your e-mail.")
                .await?;
            Ok(Redirect::to("/login").into_response())
        }
        Err(e) => flash_or_fail(&sess, e, "/forgotpass").await,
    }
}

// ---- reset password ----

#[derive(Deserialize)]
pub struct ResetPassQuery {
    #[serde(default)]
    pub r: String,
}

#[derive(Deserialize)]
pub struct ResetPassForm {
    #[serde(default)]
    pub csrf: String,
    #[serde(default)]
    pub r: String,
    #[serde(default)]
    pub passwd: String,
    #[serde(default)]
    pub confirm: String,
}

pub async fn resetpass_form(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResetPassQuery>,
    sess: ForumSession,
) -> Result<Response, WebError> {
    // 403 for unknown, expired, and consumed tokens alike.
    state.auth.username_for_reset_token(&query.r).await?;

    let chrome = chrome(&state, &sess, "/login").await?;
    Ok(Page::new("resetpass.html")
        .var("title", "Reset password")
        .var("forum_name", chrome.forum_name)
        .var("msg", chrome.msg)
        .var("csrf", sess.csrf_token())
        .var("reset_token", query.r)
        .raw("usernav", chrome.usernav)
        .raw("footer", chrome.footer)
        .render()?
        .into_response())
}

pub async fn resetpass_submit(
    State(state): State<Arc<AppState>>,
    sess: ForumSession,
    Form(form): Form<ResetPassForm>,
) -> Result<Response, WebError> {
    sess.verify_csrf(&form.csrf)?;

    match state
        .auth
        .reset_password(&form.r, &form.passwd, &form.confirm)
        .await
    {
        Ok(()) => {
            sess.set_flash_msg("Password change successful.").await?;
            Ok(Redirect::to("/login").into_response())
        }
        Err(AuthError::InvalidToken) => Err(WebError::Forbidden),
        Err(e) => {
            let back = format!("/resetpass?r={}", urlencoding::encode(&form.r));
            flash_or_fail(&sess, e, &back).await
        }
    }
}
