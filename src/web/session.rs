//! Per-request session abstraction.
//!
//! Cookie continuity, expiry, and Set-Cookie emission belong to the
//! `tower-sessions` layer; this wrapper owns the semantics on top: a CSRF
//! token fixed for the session's lifetime, the bound identity, and the
//! one-shot flash message. Opening a session never fails — a missing or
//! invalid cookie just means the anonymous state.

use axum::{extract::FromRequestParts, http::request::Parts};
use subtle::ConstantTimeEq;
use tower_sessions::Session;

use crate::db::Store;
use crate::db::repositories::token::generate_token;
use crate::services::{AuthError, AuthService};
use crate::web::error::WebError;

const CSRF_KEY: &str = "csrf";
const USER_KEY: &str = "user";
const FLASH_KEY: &str = "flash";

pub struct ForumSession {
    inner: Session,
    csrf_token: String,
}

impl ForumSession {
    /// Resolve the request's session, minting a CSRF token on first touch so
    /// it stays stable for every later request on the same cookie.
    pub async fn open(session: Session) -> Result<Self, WebError> {
        let csrf_token = match session
            .get::<String>(CSRF_KEY)
            .await
            .map_err(|e| WebError::internal(format!("Session load failed: {e}")))?
        {
            Some(token) => token,
            None => {
                let token = generate_token();
                session
                    .insert(CSRF_KEY, token.clone())
                    .await
                    .map_err(|e| WebError::internal(format!("Session write failed: {e}")))?;
                token
            }
        };

        Ok(Self {
            inner: session,
            csrf_token,
        })
    }

    #[must_use]
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// Gate for every state-mutating POST. Constant-time comparison; a
    /// mismatch is a 403 before any mutation is attempted.
    pub fn verify_csrf(&self, presented: &str) -> Result<(), WebError> {
        let matches: bool = self
            .csrf_token
            .as_bytes()
            .ct_eq(presented.as_bytes())
            .into();
        if matches { Ok(()) } else { Err(WebError::Forbidden) }
    }

    /// Check credentials and, on success, bind the identity to this session.
    /// The session id is cycled on success so a pre-login cookie can never be
    /// fixated onto an authenticated session.
    pub async fn authenticate(
        &self,
        auth: &dyn AuthService,
        username: &str,
        password: &str,
    ) -> Result<bool, WebError> {
        match auth.login(username, password).await {
            Ok(()) => {
                self.inner
                    .cycle_id()
                    .await
                    .map_err(|e| WebError::internal(format!("Session cycle failed: {e}")))?;
                self.inner
                    .insert(USER_KEY, username.to_string())
                    .await
                    .map_err(|e| WebError::internal(format!("Session write failed: {e}")))?;
                Ok(true)
            }
            Err(AuthError::BadCredentials) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// The bound username, or `None` for anonymous sessions. Callers branch
    /// on the `Option`; an empty string is never a sentinel.
    pub async fn user_name(&self) -> Result<Option<String>, WebError> {
        self.inner
            .get::<String>(USER_KEY)
            .await
            .map_err(|e| WebError::internal(format!("Session load failed: {e}")))
    }

    pub async fn is_user_valid(&self) -> Result<bool, WebError> {
        Ok(self.user_name().await?.is_some())
    }

    /// False for anonymous sessions; the role flag comes from the store, not
    /// the cookie.
    pub async fn is_user_super_admin(&self, store: &Store) -> Result<bool, WebError> {
        match self.user_name().await? {
            Some(username) => Ok(store.is_super_admin(&username).await?),
            None => Ok(false),
        }
    }

    pub async fn set_flash_msg(&self, msg: &str) -> Result<(), WebError> {
        self.inner
            .insert(FLASH_KEY, msg.to_string())
            .await
            .map_err(|e| WebError::internal(format!("Session write failed: {e}")))
    }

    /// Read-and-clear: the message is surfaced exactly once.
    pub async fn flash_msg(&self) -> Result<String, WebError> {
        Ok(self
            .inner
            .remove::<String>(FLASH_KEY)
            .await
            .map_err(|e| WebError::internal(format!("Session load failed: {e}")))?
            .unwrap_or_default())
    }

    /// Drop the server-side entry and instruct the client to discard the
    /// cookie.
    pub async fn clear(&self) -> Result<(), WebError> {
        self.inner
            .flush()
            .await
            .map_err(|e| WebError::internal(format!("Session flush failed: {e}")))
    }
}

impl<S> FromRequestParts<S> for ForumSession
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| WebError::internal(format!("Session layer missing: {msg}")))?;

        Self::open(session).await
    }
}
