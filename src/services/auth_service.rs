//! Domain service for accounts, credentials, and password recovery.
//!
//! Every privileged handler goes through this contract. Validation and
//! authorization failures come back as typed errors whose display strings
//! are the user-facing flash messages; only `Database`/`Internal` represent
//! unexpected backend trouble.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username cannot be blank.")]
    BlankUsername,

    #[error("Username can contain only alphabets, numbers, and underscore.")]
    InvalidUsername,

    #[error("Username already registered.")]
    UsernameTaken,

    #[error("Username doesn't exist.")]
    UnknownUser,

    #[error("Password should have at least 8 characters.")]
    PasswordTooShort,

    #[error("Passwords don't match.")]
    PasswordMismatch,

    #[error("Incorrect username/password")]
    BadCredentials,

    #[error("Current password incorrect.")]
    CurrentPasswordIncorrect,

    #[error("E-mail address not set. Contact site admin to reset the password.")]
    EmailNotSet,

    #[error("Signups are disabled on this forum.")]
    SignupDisabled,

    /// Unknown, expired, and consumed tokens are deliberately one case.
    #[error("Invalid or expired link")]
    InvalidToken,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl AuthError {
    /// Validation-class failures are flashed back at the originating form;
    /// everything else escalates to the error boundary.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Database(_))
    }
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Create an account. Validates the username and password policy,
    /// honors the signup-disabled switch, and makes the first account on an
    /// empty database a superadmin.
    async fn signup(
        &self,
        username: &str,
        password: &str,
        confirm: &str,
        email: &str,
    ) -> Result<(), AuthError>;

    /// Check a credential pair. Failure does not reveal whether the
    /// username exists, in the return value or in timing.
    async fn login(&self, username: &str, password: &str) -> Result<(), AuthError>;

    /// Change the password of an already-authenticated user after
    /// re-verifying the current one.
    async fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
        confirm: &str,
    ) -> Result<(), AuthError>;

    /// Issue a recovery token and mail the reset link. `host` is the
    /// request's Host header, used to build the link.
    async fn request_password_reset(&self, username: &str, host: &str) -> Result<(), AuthError>;

    /// Whose password a live token would reset. Does not consume it.
    async fn username_for_reset_token(&self, token: &str) -> Result<String, AuthError>;

    /// Redeem a token and set the new password. Consumption and the update
    /// are ordered so a token can never produce two password changes.
    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        confirm: &str,
    ) -> Result<(), AuthError>;
}

/// Password policy shared by signup, change-password, and reset-password.
/// Runs before anything is hashed or persisted.
pub fn validate_password(password: &str, confirm: &str) -> Result<(), AuthError> {
    if password.len() < 8 {
        return Err(AuthError::PasswordTooShort);
    }
    if password != confirm {
        return Err(AuthError::PasswordMismatch);
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), AuthError> {
    if username.is_empty() {
        return Err(AuthError::BlankUsername);
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AuthError::InvalidUsername);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_policy() {
        assert!(validate_password("longenough1", "longenough1").is_ok());
        assert!(matches!(
            validate_password("short", "short"),
            Err(AuthError::PasswordTooShort)
        ));
        assert!(matches!(
            validate_password("longenough1", "different11"),
            Err(AuthError::PasswordMismatch)
        ));
    }

    #[test]
    fn username_policy() {
        assert!(validate_username("bob_99").is_ok());
        assert!(matches!(validate_username(""), Err(AuthError::BlankUsername)));
        assert!(matches!(
            validate_username("bob-99"),
            Err(AuthError::InvalidUsername)
        ));
        assert!(matches!(
            validate_username("bob 99"),
            Err(AuthError::InvalidUsername)
        ));
    }

    #[test]
    fn database_errors_are_not_user_facing() {
        assert!(!AuthError::Database("boom".into()).is_user_facing());
        assert!(AuthError::UsernameTaken.is_user_facing());
    }
}
