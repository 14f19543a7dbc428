use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, SqlErr,
    sea_query::{Expr, Query},
};
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};
use tokio::task;

use crate::config::SecurityConfig;
use crate::entities::users;

/// Pad hashes for unknown usernames, keyed by Argon2 cost so the failure
/// path costs the same as a real mismatch under the active parameters and
/// does not leak account existence through timing.
static DUMMY_HASHES: LazyLock<Mutex<HashMap<(u32, u32, u32), String>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn dummy_hash(config: Option<&SecurityConfig>) -> Result<String> {
    let key = match config {
        Some(cfg) => (
            cfg.argon2_memory_cost_kib,
            cfg.argon2_time_cost,
            cfg.argon2_parallelism,
        ),
        None => (
            Params::DEFAULT_M_COST,
            Params::DEFAULT_T_COST,
            Params::DEFAULT_P_COST,
        ),
    };

    {
        let cache = DUMMY_HASHES.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(hash) = cache.get(&key) {
            return Ok(hash.clone());
        }
    }

    // Lock released while hashing; a racing duplicate is harmless.
    let hash = hash_password("emberforum-timing-pad", config)?;
    let mut cache = DUMMY_HASHES.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(cache.entry(key).or_insert(hash).clone())
}

/// User data returned from the repository (password hash stays inside).
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub is_super_admin: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            is_super_admin: model.is_super_admin,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Existence check. Reveals nothing beyond whether the name is taken.
    pub async fn probe(&self, username: &str) -> Result<bool> {
        let count = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .count(&self.conn)
            .await
            .context("Failed to probe user")?;

        Ok(count > 0)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")?;

        Ok(user.map(User::from))
    }

    pub async fn count(&self) -> Result<u64> {
        users::Entity::find()
            .count(&self.conn)
            .await
            .context("Failed to count users")
    }

    /// Insert a new user with a freshly hashed password.
    ///
    /// Returns `Ok(false)` when the username is already taken. The check is
    /// the UNIQUE index on `users.username`, so two concurrent signups with
    /// the same name cannot both succeed.
    pub async fn create(
        &self,
        username: &str,
        password: &str,
        email: &str,
        is_super_admin: bool,
        config: Option<&SecurityConfig>,
    ) -> Result<bool> {
        let password = password.to_string();
        let config = config.cloned();
        let password_hash =
            task::spawn_blocking(move || hash_password(&password, config.as_ref()))
                .await
                .context("Password hashing task panicked")??;

        let now = chrono::Utc::now().to_rfc3339();
        let user = users::ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(password_hash),
            email: Set(email.to_string()),
            is_super_admin: Set(is_super_admin),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        match user.insert(&self.conn).await {
            Ok(_) => Ok(true),
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => Ok(false),
                _ => Err(e).context("Failed to insert user"),
            },
        }
    }

    /// Verify a password for a user.
    ///
    /// Argon2 runs on `spawn_blocking` because it is CPU-intensive and would
    /// stall the async runtime. Unknown usernames are verified against a pad
    /// hash with the same cost parameters so both failure paths take the
    /// same time.
    pub async fn verify_password(
        &self,
        username: &str,
        password: &str,
        config: Option<&SecurityConfig>,
    ) -> Result<bool> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        let (stored_hash, user_exists) = match user {
            Some(user) => (Some(user.password_hash), true),
            None => (None, false),
        };

        let password = password.to_string();
        let config = config.cloned();
        let matched = task::spawn_blocking(move || {
            let password_hash = match stored_hash {
                Some(hash) => hash,
                None => dummy_hash(config.as_ref())?,
            };
            let parsed_hash = PasswordHash::new(&password_hash)
                .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

            let argon2 = Argon2::default();
            Ok::<bool, anyhow::Error>(
                argon2
                    .verify_password(password.as_bytes(), &parsed_hash)
                    .is_ok(),
            )
        })
        .await
        .context("Password verification task panicked")??;

        Ok(matched && user_exists)
    }

    /// Replace the stored hash for a user.
    pub async fn update_password(
        &self,
        username: &str,
        new_password: &str,
        config: Option<&SecurityConfig>,
    ) -> Result<()> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user for password update")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {username}"))?;

        let password = new_password.to_string();
        let config = config.cloned();
        let new_hash = task::spawn_blocking(move || hash_password(&password, config.as_ref()))
            .await
            .context("Password hashing task panicked")??;

        let now = chrono::Utc::now().to_rfc3339();

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash);
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(())
    }

    /// Empty string when the user never set one.
    pub async fn read_email(&self, username: &str) -> Result<String> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user for email")?;

        Ok(user.map(|u| u.email).unwrap_or_default())
    }

    pub async fn is_super_admin(&self, username: &str) -> Result<bool> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user for role check")?;

        Ok(user.is_some_and(|u| u.is_super_admin))
    }

    pub async fn set_super_admin(&self, username: &str, is_super_admin: bool) -> Result<bool> {
        let Some(user) = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user for promotion")?
        else {
            return Ok(false);
        };

        let now = chrono::Utc::now().to_rfc3339();
        let mut active: users::ActiveModel = user.into();
        active.is_super_admin = Set(is_super_admin);
        active.updated_at = Set(now);
        active.update(&self.conn).await?;

        Ok(true)
    }

    /// Give the superadmin role to the earliest account. Racing callers all
    /// target the same row, so the role lands exactly once no matter how
    /// many signups observed an empty table.
    pub async fn grant_founder_role(&self) -> Result<()> {
        let earliest = Query::select()
            .expr(users::Column::Id.min())
            .from(users::Entity)
            .to_owned();

        users::Entity::update_many()
            .col_expr(users::Column::IsSuperAdmin, Expr::value(true))
            .filter(users::Column::Id.in_subquery(earliest))
            .exec(&self.conn)
            .await
            .context("Failed to grant founder role")?;

        Ok(())
    }
}

/// Hash a password using Argon2id with optional custom params.
pub fn hash_password(password: &str, config: Option<&SecurityConfig>) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = if let Some(cfg) = config {
        let params = Params::new(
            cfg.argon2_memory_cost_kib,
            cfg.argon2_time_cost,
            cfg.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    } else {
        Argon2::default()
    };

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;

    async fn test_store() -> Store {
        Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .expect("in-memory store")
    }

    #[test]
    fn hash_is_salted() {
        let a = hash_password("longenough1", None).unwrap();
        let b = hash_password("longenough1", None).unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn create_then_verify_round_trip() {
        let store = test_store().await;
        let repo = UserRepository::new(store.conn.clone());

        assert!(repo.create("bob_99", "longenough1", "", false, None).await.unwrap());
        assert!(repo.verify_password("bob_99", "longenough1", None).await.unwrap());
        assert!(!repo.verify_password("bob_99", "wrongpassword", None).await.unwrap());
        assert!(!repo.verify_password("nobody", "longenough1", None).await.unwrap());
    }

    #[test]
    fn timing_pad_inherits_configured_cost() {
        // The pad verified for unknown usernames must carry the same Argon2
        // parameters as real account hashes, or the two failure paths would
        // take different time.
        let cfg = SecurityConfig::default();
        let pad = dummy_hash(Some(&cfg)).unwrap();
        let account = hash_password("longenough1", Some(&cfg)).unwrap();

        assert_eq!(pad.split('$').nth(3), account.split('$').nth(3));
        assert!(pad.contains(&format!("m={}", cfg.argon2_memory_cost_kib)));
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = test_store().await;
        let repo = UserRepository::new(store.conn.clone());

        assert!(repo.create("bob_99", "longenough1", "", false, None).await.unwrap());
        assert!(!repo.create("bob_99", "otherpassword", "", false, None).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_password_takes_effect() {
        let store = test_store().await;
        let repo = UserRepository::new(store.conn.clone());

        repo.create("alice", "longenough1", "a@example.com", false, None)
            .await
            .unwrap();
        repo.update_password("alice", "evenlonger22", None).await.unwrap();

        assert!(!repo.verify_password("alice", "longenough1", None).await.unwrap());
        assert!(repo.verify_password("alice", "evenlonger22", None).await.unwrap());
    }

    #[tokio::test]
    async fn founder_role_lands_on_one_user() {
        let store = test_store().await;
        let repo = UserRepository::new(store.conn.clone());

        repo.create("alice", "longenough1", "", false, None).await.unwrap();
        repo.create("bob", "longenough1", "", false, None).await.unwrap();

        // Two racers that both saw an empty table both run the grant; only
        // the earliest row gets the role.
        repo.grant_founder_role().await.unwrap();
        repo.grant_founder_role().await.unwrap();

        assert!(repo.is_super_admin("alice").await.unwrap());
        assert!(!repo.is_super_admin("bob").await.unwrap());
    }

    #[tokio::test]
    async fn email_defaults_to_empty() {
        let store = test_store().await;
        let repo = UserRepository::new(store.conn.clone());

        repo.create("alice", "longenough1", "", false, None).await.unwrap();
        assert_eq!(repo.read_email("alice").await.unwrap(), "");
        assert_eq!(repo.read_email("nobody").await.unwrap(), "");
    }

    #[tokio::test]
    async fn super_admin_flag_round_trip() {
        let store = test_store().await;
        let repo = UserRepository::new(store.conn.clone());

        repo.create("root", "longenough1", "", true, None).await.unwrap();
        repo.create("bob", "longenough1", "", false, None).await.unwrap();

        assert!(repo.is_super_admin("root").await.unwrap());
        assert!(!repo.is_super_admin("bob").await.unwrap());
        assert!(!repo.is_super_admin("nobody").await.unwrap());

        assert!(repo.set_super_admin("bob", true).await.unwrap());
        assert!(repo.is_super_admin("bob").await.unwrap());
        assert!(!repo.set_super_admin("nobody", true).await.unwrap());
    }
}
