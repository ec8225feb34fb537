use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{query, query_as, FromRow, SqliteConnection, SqlitePool, Type};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "lowercase")] // SQL value name
#[serde(rename_all = "lowercase")] // JSON value name
pub enum Role {
    Assistant,
    User,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    /// What the user sees: the question as typed, or the rendered HTML answer.
    pub content: String,
    /// Markdown the model produced, kept so a rebuilt session replays the model's own words.
    #[serde(skip_serializing)]
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Default for Message {
    fn default() -> Self {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::nil(),
            role: Role::User,
            content: String::new(),
            source: None,
            created_at: Utc::now(),
        }
    }
}

impl Message {
    pub async fn new(pool: &SqlitePool, conversation_id: Uuid, role: Role, content: &str) -> Result<Self> {
        let message = Message {
            conversation_id,
            role,
            content: content.to_string(),
            ..Default::default()
        };

        let mut conn = pool.acquire().await?;
        message.insert(&mut *conn).await?;
        Ok(message)
    }

    /// Stores one completed turn atomically: the user's question followed by the assistant's
    /// rendered reply and its markdown source.
    pub async fn save_turn(
        pool: &SqlitePool,
        conversation_id: Uuid,
        user_text: &str,
        answer_html: &str,
        answer_markdown: &str,
    ) -> Result<(Self, Self)> {
        let question = Message {
            conversation_id,
            role: Role::User,
            content: user_text.to_string(),
            ..Default::default()
        };
        let answer = Message {
            conversation_id,
            role: Role::Assistant,
            content: answer_html.to_string(),
            source: Some(answer_markdown.to_string()),
            ..Default::default()
        };

        let mut tx = pool.begin().await?;
        question.insert(&mut *tx).await?;
        answer.insert(&mut *tx).await?;
        tx.commit().await?;

        Ok((question, answer))
    }

    async fn insert(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        query(
            r#"
            INSERT INTO chat_message (id, conversation_id, role, content, source, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(self.id)
        .bind(self.conversation_id)
        .bind(self.role)
        .bind(&self.content)
        .bind(&self.source)
        .bind(self.created_at)
        .execute(conn)
        .await?;

        debug!("Message {} stored in conversation {}", self.id, self.conversation_id);
        Ok(())
    }

    /// The text to replay to the model for this message.
    pub fn model_text(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.content)
    }

    /// Messages of a conversation in chronological order.
    pub async fn list_for_conversation(pool: &SqlitePool, conversation_id: Uuid) -> Result<Vec<Self>> {
        let messages = query_as::<_, Message>(
            r#"
            SELECT id, conversation_id, role, content, source, created_at FROM chat_message
            WHERE conversation_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(pool)
        .await?;

        Ok(messages)
    }

    #[cfg(test)]
    pub async fn count_for_conversation(pool: &SqlitePool, conversation_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM chat_message WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}
