use anyhow::anyhow;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use tracing::debug;

use crate::config::AppConfig;
use crate::models::Role;

/// A hosted chat-completion model. Takes the full exchange and returns the markdown reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> anyhow::Result<String>;
}

pub struct OpenAiChatModel {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(app_config: &AppConfig) -> Self {
        let client = Client::with_config(
            OpenAIConfig::new()
                .with_api_key(app_config.llm_api_key.clone())
                .with_api_base(app_config.llm_api_base.clone()),
        );

        OpenAiChatModel {
            client,
            model: app_config.llm_model.clone(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, messages: Vec<ChatCompletionRequestMessage>) -> anyhow::Result<String> {
        debug!("Sending {} messages to {}", messages.len(), self.model);

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .ok_or_else(|| anyhow!("No response from the model"))?
            .message
            .content
            .as_ref()
            .ok_or_else(|| anyhow!("No content in the model response"))?
            .clone();

        Ok(content)
    }
}

/// Builds a request message for one stored or in-flight turn.
pub fn turn(role: Role, content: &str) -> anyhow::Result<ChatCompletionRequestMessage> {
    let message = match role {
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    };
    Ok(message)
}
