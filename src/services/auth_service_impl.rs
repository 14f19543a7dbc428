//! `Store`-backed implementation of the `AuthService` trait.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Store;
use crate::db::repositories::settings;
use crate::mail::Mailer;
use crate::services::auth_service::{
    AuthError, AuthService, validate_password, validate_username,
};

pub struct StoreAuthService {
    store: Store,
    mailer: Arc<dyn Mailer>,
    config: Arc<RwLock<Config>>,
}

impl StoreAuthService {
    #[must_use]
    pub const fn new(store: Store, mailer: Arc<dyn Mailer>, config: Arc<RwLock<Config>>) -> Self {
        Self {
            store,
            mailer,
            config,
        }
    }
}

#[async_trait]
impl AuthService for StoreAuthService {
    async fn signup(
        &self,
        username: &str,
        password: &str,
        confirm: &str,
        email: &str,
    ) -> Result<(), AuthError> {
        if self.store.read_setting(settings::SIGNUP_DISABLED).await? == "1" {
            return Err(AuthError::SignupDisabled);
        }

        validate_username(username)?;
        if self.store.probe_user(username).await? {
            return Err(AuthError::UsernameTaken);
        }
        validate_password(password, confirm)?;

        let security = self.config.read().await.security.clone();

        // First account on an empty database gets the superadmin role.
        let is_first = self.store.count_users().await? == 0;

        let created = self
            .store
            .create_user(username, password, email, false, Some(&security))
            .await?;
        if !created {
            // Lost a race with a concurrent signup for the same name.
            return Err(AuthError::UsernameTaken);
        }

        if is_first {
            // The grant targets the earliest row, so two racing first
            // signups cannot both end up with the role.
            self.store.grant_founder_role().await?;
        }

        info!("User created: {username} (first account: {is_first})");
        Ok(())
    }

    async fn login(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let security = self.config.read().await.security.clone();
        if self
            .store
            .verify_user_password(username, password, Some(&security))
            .await?
        {
            Ok(())
        } else {
            Err(AuthError::BadCredentials)
        }
    }

    async fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
        confirm: &str,
    ) -> Result<(), AuthError> {
        let security = self.config.read().await.security.clone();
        if !self
            .store
            .verify_user_password(username, current_password, Some(&security))
            .await?
        {
            return Err(AuthError::CurrentPasswordIncorrect);
        }
        validate_password(new_password, confirm)?;

        self.store
            .update_user_password(username, new_password, Some(&security))
            .await?;

        info!("Password changed for user: {username}");
        Ok(())
    }

    async fn request_password_reset(&self, username: &str, host: &str) -> Result<(), AuthError> {
        if username.is_empty() || !self.store.probe_user(username).await? {
            return Err(AuthError::UnknownUser);
        }

        let email = self.store.read_user_email(username).await?;
        if !email.contains('@') {
            return Err(AuthError::EmailNotSet);
        }

        let ttl_seconds = self.config.read().await.security.reset_token_ttl_minutes * 60;
        let token = self.store.create_reset_token(username, ttl_seconds).await?;

        let forum_name = self.store.read_setting(settings::FORUM_NAME).await?;
        let reset_link = format!("https://{host}/resetpass?r={token}");
        let subject = format!("{forum_name} Password Recovery");
        let body = format!(
            "Someone (hopefully you) requested we reset your password at {forum_name}.\r\n\
             If you want to change it, visit {reset_link}\r\n\r\n\
             If not, just ignore this message."
        );

        // Fire-and-forget: delivery trouble is logged, never surfaced to the
        // requester, and never includes the token.
        if let Err(e) = self.mailer.send(&email, &subject, &body).await {
            warn!("Failed to send password recovery mail for {username}: {e}");
        }

        info!("Password reset token issued for user: {username}");
        Ok(())
    }

    async fn username_for_reset_token(&self, token: &str) -> Result<String, AuthError> {
        self.store
            .read_username_by_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)
    }

    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        confirm: &str,
    ) -> Result<(), AuthError> {
        validate_password(new_password, confirm)?;

        // Consuming first means a losing racer stops here; the winner is the
        // only caller that reaches the password update.
        let username = self
            .store
            .consume_reset_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let security = self.config.read().await.security.clone();
        self.store
            .update_user_password(&username, new_password, Some(&security))
            .await?;

        info!("Password reset completed for user: {username}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::Mutex;

    /// Captures outbound mail for assertions.
    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    async fn service() -> (StoreAuthService, Arc<RecordingMailer>, Store) {
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let service = StoreAuthService::new(
            store.clone(),
            mailer.clone(),
            Arc::new(RwLock::new(Config::default())),
        );
        (service, mailer, store)
    }

    #[tokio::test]
    async fn signup_then_login() {
        let (service, _, _) = service().await;

        service
            .signup("bob_99", "longenough1", "longenough1", "")
            .await
            .unwrap();
        service.login("bob_99", "longenough1").await.unwrap();

        assert!(matches!(
            service.login("bob_99", "wrongpassword").await,
            Err(AuthError::BadCredentials)
        ));
        assert!(matches!(
            service.login("nobody", "longenough1").await,
            Err(AuthError::BadCredentials)
        ));
    }

    #[tokio::test]
    async fn duplicate_signup_is_rejected() {
        let (service, _, _) = service().await;

        service
            .signup("bob_99", "longenough1", "longenough1", "")
            .await
            .unwrap();
        assert!(matches!(
            service.signup("bob_99", "otherpass99", "otherpass99", "").await,
            Err(AuthError::UsernameTaken)
        ));
    }

    #[tokio::test]
    async fn first_user_is_super_admin() {
        let (service, _, store) = service().await;

        service
            .signup("root", "longenough1", "longenough1", "")
            .await
            .unwrap();
        service
            .signup("bob", "longenough1", "longenough1", "")
            .await
            .unwrap();

        assert!(store.is_super_admin("root").await.unwrap());
        assert!(!store.is_super_admin("bob").await.unwrap());
    }

    #[tokio::test]
    async fn racing_first_signups_yield_one_super_admin() {
        let (service, _, store) = service().await;

        // Both may observe an empty table before either insert lands.
        let (a, b) = tokio::join!(
            service.signup("alice", "longenough1", "longenough1", ""),
            service.signup("bob_99", "longenough1", "longenough1", ""),
        );
        a.unwrap();
        b.unwrap();

        let admins = [
            store.is_super_admin("alice").await.unwrap(),
            store.is_super_admin("bob_99").await.unwrap(),
        ];
        assert_eq!(admins.iter().filter(|granted| **granted).count(), 1);
    }

    #[tokio::test]
    async fn signup_disabled_switch() {
        let (service, _, store) = service().await;

        store.write_setting(settings::SIGNUP_DISABLED, "1").await.unwrap();
        assert!(matches!(
            service.signup("bob", "longenough1", "longenough1", "").await,
            Err(AuthError::SignupDisabled)
        ));
    }

    #[tokio::test]
    async fn change_password_requires_current() {
        let (service, _, _) = service().await;

        service
            .signup("bob", "longenough1", "longenough1", "")
            .await
            .unwrap();

        assert!(matches!(
            service
                .change_password("bob", "wrongcurrent", "newpassword1", "newpassword1")
                .await,
            Err(AuthError::CurrentPasswordIncorrect)
        ));

        service
            .change_password("bob", "longenough1", "newpassword1", "newpassword1")
            .await
            .unwrap();
        service.login("bob", "newpassword1").await.unwrap();
    }

    #[tokio::test]
    async fn reset_flow_consumes_the_token() {
        let (service, mailer, _) = service().await;

        service
            .signup("bob", "longenough1", "longenough1", "bob@example.com")
            .await
            .unwrap();
        service
            .request_password_reset("bob", "forum.example")
            .await
            .unwrap();

        let sent = mailer.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "bob@example.com");

        let token = sent[0]
            .2
            .split("resetpass?r=")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap()
            .to_string();

        assert_eq!(service.username_for_reset_token(&token).await.unwrap(), "bob");

        service
            .reset_password(&token, "afterreset1", "afterreset1")
            .await
            .unwrap();
        service.login("bob", "afterreset1").await.unwrap();

        assert!(matches!(
            service.reset_password(&token, "again12345", "again12345").await,
            Err(AuthError::InvalidToken)
        ));
        assert!(matches!(
            service.username_for_reset_token(&token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn reset_without_email_sends_nothing() {
        let (service, mailer, _) = service().await;

        service
            .signup("bob", "longenough1", "longenough1", "")
            .await
            .unwrap();

        assert!(matches!(
            service.request_password_reset("bob", "forum.example").await,
            Err(AuthError::EmailNotSet)
        ));
        assert!(matches!(
            service.request_password_reset("nobody", "forum.example").await,
            Err(AuthError::UnknownUser)
        ));
        assert!(mailer.sent.lock().unwrap().is_empty());
    }
}
