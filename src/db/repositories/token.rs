use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use subtle::ConstantTimeEq;

use crate::entities::reset_tokens;

pub struct TokenRepository {
    conn: DatabaseConnection,
}

impl TokenRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Issue a fresh single-use reset token for `username`, valid for
    /// `ttl_seconds` from now. Returns the opaque token string; the caller
    /// embeds it in the recovery URL and must treat it as a secret.
    pub async fn create(&self, username: &str, ttl_seconds: i64) -> Result<String> {
        let token = generate_token();
        let now = chrono::Utc::now();

        let row = reset_tokens::ActiveModel {
            token: Set(token.clone()),
            username: Set(username.to_string()),
            created_at: Set(now.to_rfc3339()),
            expires_at: Set(now.timestamp() + ttl_seconds),
            consumed: Set(false),
            ..Default::default()
        };
        row.insert(&self.conn)
            .await
            .context("Failed to insert reset token")?;

        Ok(token)
    }

    /// Look up the username a token authorizes, without consuming it.
    ///
    /// Returns `None` for tokens that are unknown, expired, or already
    /// consumed; callers must not distinguish the three.
    pub async fn read_username(&self, token: &str) -> Result<Option<String>> {
        Ok(self.find_live(token).await?.map(|row| row.username))
    }

    /// Redeem a token: exactly one of any number of concurrent redemptions
    /// wins. The flip to `consumed` is a conditional UPDATE on the still-live
    /// row, so losers observe zero affected rows and get `None`.
    pub async fn consume(&self, token: &str) -> Result<Option<String>> {
        let Some(row) = self.find_live(token).await? else {
            return Ok(None);
        };

        let now = chrono::Utc::now().timestamp();
        let res = reset_tokens::Entity::update_many()
            .col_expr(
                reset_tokens::Column::Consumed,
                sea_orm::sea_query::Expr::value(true),
            )
            .filter(reset_tokens::Column::Id.eq(row.id))
            .filter(reset_tokens::Column::Consumed.eq(false))
            .filter(reset_tokens::Column::ExpiresAt.gt(now))
            .exec(&self.conn)
            .await
            .context("Failed to consume reset token")?;

        if res.rows_affected == 1 {
            Ok(Some(row.username))
        } else {
            Ok(None)
        }
    }

    /// Drop rows that can never validate again.
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();
        let res = reset_tokens::Entity::delete_many()
            .filter(
                reset_tokens::Column::ExpiresAt
                    .lte(now)
                    .or(reset_tokens::Column::Consumed.eq(true)),
            )
            .exec(&self.conn)
            .await
            .context("Failed to purge reset tokens")?;

        Ok(res.rows_affected)
    }

    /// Fetch the row for a token if it is live (exists, unexpired,
    /// unconsumed). The fetched token is re-checked with a constant-time
    /// comparison rather than trusting the index lookup alone.
    async fn find_live(&self, token: &str) -> Result<Option<reset_tokens::Model>> {
        if token.is_empty() {
            return Ok(None);
        }

        let row = reset_tokens::Entity::find()
            .filter(reset_tokens::Column::Token.eq(token))
            .one(&self.conn)
            .await
            .context("Failed to query reset token")?;

        let now = chrono::Utc::now().timestamp();
        Ok(row.filter(|r| {
            let matches: bool = r.token.as_bytes().ct_eq(token.as_bytes()).into();
            matches && !r.consumed && r.expires_at > now
        }))
    }
}

/// Random 64-char hex string (32 bytes of OS entropy).
#[must_use]
pub fn generate_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
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
    fn tokens_are_unique_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn read_does_not_consume() {
        let store = test_store().await;
        let repo = TokenRepository::new(store.conn.clone());

        let token = repo.create("bob", 3600).await.unwrap();
        assert_eq!(repo.read_username(&token).await.unwrap().as_deref(), Some("bob"));
        assert_eq!(repo.read_username(&token).await.unwrap().as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn consume_is_single_use() {
        let store = test_store().await;
        let repo = TokenRepository::new(store.conn.clone());

        let token = repo.create("bob", 3600).await.unwrap();
        assert_eq!(repo.consume(&token).await.unwrap().as_deref(), Some("bob"));
        assert_eq!(repo.consume(&token).await.unwrap(), None);
        assert_eq!(repo.read_username(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn racing_redemptions_have_one_winner() {
        let store = test_store().await;
        let token = TokenRepository::new(store.conn.clone())
            .create("bob", 3600)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let conn = store.conn.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                TokenRepository::new(conn).consume(&token).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn expired_token_is_invalid() {
        let store = test_store().await;
        let repo = TokenRepository::new(store.conn.clone());

        let token = repo.create("bob", -1).await.unwrap();
        assert_eq!(repo.read_username(&token).await.unwrap(), None);
        assert_eq!(repo.consume(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let store = test_store().await;
        let repo = TokenRepository::new(store.conn.clone());

        assert_eq!(repo.read_username("deadbeef").await.unwrap(), None);
        assert_eq!(repo.read_username("").await.unwrap(), None);
    }

    #[tokio::test]
    async fn purge_removes_dead_rows() {
        let store = test_store().await;
        let repo = TokenRepository::new(store.conn.clone());

        let live = repo.create("bob", 3600).await.unwrap();
        let expired = repo.create("bob", -1).await.unwrap();
        let consumed = repo.create("bob", 3600).await.unwrap();
        repo.consume(&consumed).await.unwrap();

        assert_eq!(repo.purge_expired().await.unwrap(), 2);
        assert_eq!(repo.read_username(&live).await.unwrap().as_deref(), Some("bob"));
        assert_eq!(repo.read_username(&expired).await.unwrap(), None);
    }
}
