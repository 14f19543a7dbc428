use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set,
};

use crate::entities::extra_notes;

pub use crate::entities::extra_notes::Model as ExtraNote;

/// Footer-link CRUD. Notes are either an external URL (redirect target) or
/// inline content rendered at /note?id=.
pub struct NoteRepository {
    conn: DatabaseConnection,
}

impl NoteRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn list(&self) -> Result<Vec<ExtraNote>> {
        extra_notes::Entity::find()
            .order_by_asc(extra_notes::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list extra notes")
    }

    pub async fn get(&self, id: i32) -> Result<Option<ExtraNote>> {
        extra_notes::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to read extra note")
    }

    pub async fn create(&self, name: &str, url: &str, content: &str) -> Result<i32> {
        let now = chrono::Utc::now().to_rfc3339();
        let note = extra_notes::ActiveModel {
            name: Set(name.to_string()),
            url: Set(url.to_string()),
            content: Set(content.to_string()),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let inserted = note
            .insert(&self.conn)
            .await
            .context("Failed to insert extra note")?;

        Ok(inserted.id)
    }

    pub async fn update(&self, id: i32, name: &str, url: &str, content: &str) -> Result<bool> {
        let Some(note) = self.get(id).await? else {
            return Ok(false);
        };

        let mut active: extra_notes::ActiveModel = note.into();
        active.name = Set(name.to_string());
        active.url = Set(url.to_string());
        active.content = Set(content.to_string());
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());
        active.update(&self.conn).await?;

        Ok(true)
    }

    pub async fn delete(&self, id: i32) -> Result<bool> {
        let res = extra_notes::Entity::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete extra note")?;

        Ok(res.rows_affected == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;

    #[tokio::test]
    async fn crud_round_trip() {
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .unwrap();
        let repo = NoteRepository::new(store.conn.clone());

        let id = repo.create("About", "", "We talk Rust here.").await.unwrap();
        assert_eq!(repo.list().await.unwrap().len(), 1);

        assert!(repo.update(id, "About", "https://example.com", "").await.unwrap());
        let note = repo.get(id).await.unwrap().unwrap();
        assert_eq!(note.url, "https://example.com");

        assert!(repo.delete(id).await.unwrap());
        assert!(!repo.delete(id).await.unwrap());
        assert!(repo.get(id).await.unwrap().is_none());
    }
}
