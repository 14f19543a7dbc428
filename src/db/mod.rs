use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;

pub mod migrator;
pub mod repositories;

pub use repositories::notes::ExtraNote;
pub use repositories::user::User;

/// Facade over the credential store, recovery-token registry, settings, and
/// footer notes. Cheap to clone; all atomicity lives in the database
/// (UNIQUE index on usernames, conditional UPDATE on token consumption).
#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn token_repo(&self) -> repositories::token::TokenRepository {
        repositories::token::TokenRepository::new(self.conn.clone())
    }

    fn settings_repo(&self) -> repositories::settings::SettingsRepository {
        repositories::settings::SettingsRepository::new(self.conn.clone())
    }

    fn note_repo(&self) -> repositories::notes::NoteRepository {
        repositories::notes::NoteRepository::new(self.conn.clone())
    }

    // ---- credential store ----

    pub async fn probe_user(&self, username: &str) -> Result<bool> {
        self.user_repo().probe(username).await
    }

    /// `Ok(false)` when the username is already taken.
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        email: &str,
        is_super_admin: bool,
        security: Option<&SecurityConfig>,
    ) -> Result<bool> {
        self.user_repo()
            .create(username, password, email, is_super_admin, security)
            .await
    }

    pub async fn verify_user_password(
        &self,
        username: &str,
        password: &str,
        security: Option<&SecurityConfig>,
    ) -> Result<bool> {
        self.user_repo()
            .verify_password(username, password, security)
            .await
    }

    pub async fn update_user_password(
        &self,
        username: &str,
        new_password: &str,
        security: Option<&SecurityConfig>,
    ) -> Result<()> {
        self.user_repo()
            .update_password(username, new_password, security)
            .await
    }

    pub async fn read_user_email(&self, username: &str) -> Result<String> {
        self.user_repo().read_email(username).await
    }

    pub async fn is_super_admin(&self, username: &str) -> Result<bool> {
        self.user_repo().is_super_admin(username).await
    }

    pub async fn set_super_admin(&self, username: &str, is_super_admin: bool) -> Result<bool> {
        self.user_repo().set_super_admin(username, is_super_admin).await
    }

    pub async fn grant_founder_role(&self) -> Result<()> {
        self.user_repo().grant_founder_role().await
    }

    pub async fn get_user(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn count_users(&self) -> Result<u64> {
        self.user_repo().count().await
    }

    // ---- recovery token registry ----

    pub async fn create_reset_token(&self, username: &str, ttl_seconds: i64) -> Result<String> {
        self.token_repo().create(username, ttl_seconds).await
    }

    pub async fn read_username_by_token(&self, token: &str) -> Result<Option<String>> {
        self.token_repo().read_username(token).await
    }

    pub async fn consume_reset_token(&self, token: &str) -> Result<Option<String>> {
        self.token_repo().consume(token).await
    }

    pub async fn purge_expired_tokens(&self) -> Result<u64> {
        self.token_repo().purge_expired().await
    }

    // ---- forum settings ----

    pub async fn read_setting(&self, name: &str) -> Result<String> {
        self.settings_repo().read(name).await
    }

    pub async fn write_setting(&self, name: &str, value: &str) -> Result<()> {
        self.settings_repo().write(name, value).await
    }

    pub async fn all_settings(&self) -> Result<HashMap<String, String>> {
        self.settings_repo().all().await
    }

    // ---- footer notes ----

    pub async fn list_notes(&self) -> Result<Vec<ExtraNote>> {
        self.note_repo().list().await
    }

    pub async fn get_note(&self, id: i32) -> Result<Option<ExtraNote>> {
        self.note_repo().get(id).await
    }

    pub async fn create_note(&self, name: &str, url: &str, content: &str) -> Result<i32> {
        self.note_repo().create(name, url, content).await
    }

    pub async fn update_note(&self, id: i32, name: &str, url: &str, content: &str) -> Result<bool> {
        self.note_repo().update(id, name, url, content).await
    }

    pub async fn delete_note(&self, id: i32) -> Result<bool> {
        self.note_repo().delete(id).await
    }
}
