use anyhow::{Context, Result};
use sea_orm::{ActiveValue, DatabaseConnection, EntityTrait, sea_query::OnConflict};
use std::collections::HashMap;

use crate::entities::settings;

/// Setting names understood by the forum. Stored as rows so the superadmin
/// page can change them without a restart.
pub const FORUM_NAME: &str = "forum_name";
pub const HEADER_MSG: &str = "header_msg";
pub const SIGNUP_DISABLED: &str = "signup_disabled";
pub const GROUP_CREATION_DISABLED: &str = "group_creation_disabled";

pub struct SettingsRepository {
    conn: DatabaseConnection,
}

impl SettingsRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Empty string for unknown names, matching an unset value.
    pub async fn read(&self, name: &str) -> Result<String> {
        let row = settings::Entity::find_by_id(name)
            .one(&self.conn)
            .await
            .context("Failed to read setting")?;

        Ok(row.map(|r| r.value).unwrap_or_default())
    }

    pub async fn write(&self, name: &str, value: &str) -> Result<()> {
        let row = settings::ActiveModel {
            name: ActiveValue::Set(name.to_string()),
            value: ActiveValue::Set(value.to_string()),
        };

        settings::Entity::insert(row)
            .on_conflict(
                OnConflict::column(settings::Column::Name)
                    .update_column(settings::Column::Value)
                    .to_owned(),
            )
            .exec(&self.conn)
            .await
            .context("Failed to write setting")?;

        Ok(())
    }

    pub async fn all(&self) -> Result<HashMap<String, String>> {
        let rows = settings::Entity::find()
            .all(&self.conn)
            .await
            .context("Failed to list settings")?;

        Ok(rows.into_iter().map(|r| (r.name, r.value)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;

    #[tokio::test]
    async fn write_read_round_trip() {
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .unwrap();
        let repo = SettingsRepository::new(store.conn.clone());

        // Seeded by the initial migration.
        assert_eq!(repo.read(FORUM_NAME).await.unwrap(), "Ember Forum");

        repo.write(FORUM_NAME, "Rustaceans").await.unwrap();
        assert_eq!(repo.read(FORUM_NAME).await.unwrap(), "Rustaceans");

        assert_eq!(repo.read("no_such_setting").await.unwrap(), "");
        assert!(repo.all().await.unwrap().contains_key(SIGNUP_DISABLED));
    }
}
