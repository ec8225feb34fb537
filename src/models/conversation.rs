use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{query, query_as, FromRow, SqlitePool};
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "New Chat";
const TITLE_PREFIX_CHARS: usize = 50;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Default for Conversation {
    fn default() -> Self {
        Conversation {
            id: Uuid::new_v4(),
            user_id: 0,
            title: DEFAULT_TITLE.to_string(),
            created_at: Utc::now(),
        }
    }
}

impl Conversation {
    pub async fn create(pool: &SqlitePool, user_id: i64, title: &str) -> Result<Self> {
        let conversation = Conversation {
            user_id,
            title: title.to_string(),
            ..Default::default()
        };

        query(
            r#"
            INSERT INTO conversation (id, user_id, title, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(conversation.id)
        .bind(conversation.user_id)
        .bind(&conversation.title)
        .bind(conversation.created_at)
        .execute(pool)
        .await?;

        debug!("Conversation created: {:?}", conversation);
        Ok(conversation)
    }

    pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>> {
        let conversation = query_as::<_, Conversation>(
            r#"
            SELECT id, user_id, title, created_at FROM conversation
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(conversation)
    }

    /// Returns the user's conversations, most recent first.
    pub async fn list_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<Self>> {
        let conversations = query_as::<_, Conversation>(
            r#"
            SELECT id, user_id, title, created_at FROM conversation
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(conversations)
    }

    pub async fn update_title(pool: &SqlitePool, id: Uuid, title: &str) -> Result<()> {
        query(
            r#"
            UPDATE conversation
            SET title = ?
            WHERE id = ?
            "#,
        )
        .bind(title)
        .bind(id)
        .execute(pool)
        .await?;

        debug!("Conversation {} retitled to {:?}", id, title);
        Ok(())
    }

    /// Hard deletes the conversation together with all of its messages.
    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<()> {
        let mut tx = pool.begin().await?;

        let removed = query("DELETE FROM chat_message WHERE conversation_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        query("DELETE FROM conversation WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!("Conversation {} deleted with {} messages", id, removed);
        Ok(())
    }

    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_TITLE
    }
}

/// Derives a conversation title from the opening user message.
pub fn title_from_message(message: &str) -> String {
    let trimmed = message.trim();
    let mut chars = trimmed.chars();
    let prefix: String = chars.by_ref().take(TITLE_PREFIX_CHARS).collect();

    if prefix.is_empty() {
        DEFAULT_TITLE.to_string()
    } else if chars.next().is_some() {
        format!("{}...", prefix.trim_end())
    } else {
        prefix
    }
}
