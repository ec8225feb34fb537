use std::sync::Arc;
use std::time::Duration;

use async_openai::types::ChatCompletionRequestMessage;
use moka::future::Cache;
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::llm::{self, ChatModel};
use crate::models::{Message, Role};
use crate::prompts::Prompts;
use crate::render::markdown_to_html;

type SessionHistory = Arc<Mutex<Vec<ChatCompletionRequestMessage>>>;

#[derive(Clone, Debug)]
pub struct ChatSettings {
    pub idle_timeout: Duration,
    pub max_sessions: u64,
    pub max_history: usize,
}

impl From<&AppConfig> for ChatSettings {
    fn from(app_config: &AppConfig) -> Self {
        ChatSettings {
            idle_timeout: app_config.chat_idle_timeout,
            max_sessions: app_config.chat_max_sessions,
            max_history: app_config.chat_max_history,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    /// Render-ready HTML, or the fixed apology when the model could not answer.
    pub content: String,
    /// The model's markdown, as kept in the session history.
    pub markdown: String,
    pub answered: bool,
}

impl Reply {
    pub fn apology() -> Self {
        Reply {
            content: Prompts::APOLOGY.to_string(),
            markdown: Prompts::APOLOGY.to_string(),
            answered: false,
        }
    }
}

/// Routes questions to the model. Every conversation gets its own session history, evicted after
/// sitting idle and rebuilt from the stored messages when it is needed again.
pub struct ChatOrchestrator {
    model: Arc<dyn ChatModel>,
    seed: Vec<ChatCompletionRequestMessage>,
    sessions: Cache<Uuid, SessionHistory>,
    max_history: usize,
}

impl ChatOrchestrator {
    pub fn new(
        model: Arc<dyn ChatModel>,
        instructions: &str,
        settings: &ChatSettings,
    ) -> anyhow::Result<Self> {
        let seed = vec![
            llm::turn(Role::User, instructions)?,
            llm::turn(Role::Assistant, Prompts::ACKNOWLEDGEMENT)?,
        ];

        let sessions = Cache::builder()
            .max_capacity(settings.max_sessions)
            .time_to_idle(settings.idle_timeout)
            .build();

        info!(
            "Chat orchestrator ready: {} chars of instructions, sessions idle out after {:?}",
            instructions.chars().count(),
            settings.idle_timeout
        );

        Ok(ChatOrchestrator {
            model,
            seed,
            sessions,
            max_history: settings.max_history,
        })
    }

    /// Sends `text` within the conversation's session. Never fails: errors are logged and turned
    /// into the apology reply, leaving the session history untouched.
    pub async fn reply(&self, pool: &SqlitePool, conversation_id: Uuid, text: &str) -> Reply {
        match self.exchange(pool, conversation_id, text).await {
            Ok(markdown) => Reply {
                content: markdown_to_html(&markdown),
                markdown,
                answered: true,
            },
            Err(e) => {
                error!("Chat turn failed for conversation {}: {:?}", conversation_id, e);
                Reply::apology()
            }
        }
    }

    /// Drops the cached session of a conversation.
    pub async fn forget(&self, conversation_id: Uuid) {
        self.sessions.invalidate(&conversation_id).await;
    }

    async fn exchange(
        &self,
        pool: &SqlitePool,
        conversation_id: Uuid,
        text: &str,
    ) -> anyhow::Result<String> {
        let session = self.session(pool, conversation_id).await?;
        // Held across the model call so turns within one conversation stay ordered.
        let mut history = session.lock().await;

        let question = llm::turn(Role::User, text)?;
        let mut messages = Vec::with_capacity(self.seed.len() + history.len() + 1);
        messages.extend(self.seed.iter().cloned());
        messages.extend(history.iter().cloned());
        messages.push(question.clone());

        let answer = self.model.complete(messages).await?;

        history.push(question);
        history.push(llm::turn(Role::Assistant, &answer)?);
        trim_history(&mut history, self.max_history);

        Ok(answer)
    }

    async fn session(&self, pool: &SqlitePool, conversation_id: Uuid) -> anyhow::Result<SessionHistory> {
        if let Some(session) = self.sessions.get(&conversation_id).await {
            return Ok(session);
        }

        let stored = Message::list_for_conversation(pool, conversation_id).await?;
        let mut history = stored
            .iter()
            .map(|message| llm::turn(message.role, message.model_text()))
            .collect::<anyhow::Result<Vec<_>>>()?;
        trim_history(&mut history, self.max_history);

        debug!(
            "Rehydrated chat session for conversation {} with {} messages",
            conversation_id,
            history.len()
        );

        let session = Arc::new(Mutex::new(history));
        Ok(self
            .sessions
            .get_with(conversation_id, async move { session })
            .await)
    }
}

/// Keeps at most `max` trailing messages, dropping whole question/answer pairs from the front.
fn trim_history(history: &mut Vec<ChatCompletionRequestMessage>, max: usize) {
    let mut excess = history.len().saturating_sub(max);
    excess += excess % 2;
    let excess = excess.min(history.len());
    history.drain(..excess);
}
