use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Conversation, Message, Role};

#[derive(Deserialize, ToSchema)]
pub struct RenameConversationRequest {
    pub title: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
}

impl From<Conversation> for ConversationSummary {
    fn from(conversation: Conversation) -> Self {
        ConversationSummary {
            id: conversation.id,
            title: conversation.title,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct NewConversationResponse {
    pub success: bool,
    pub id: Uuid,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct MessageView {
    #[schema(value_type = String, example = "assistant")]
    pub role: Role,
    pub content: String,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        MessageView {
            role: message.role,
            content: message.content,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub conversation_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ChatResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Uuid>,
    /// Current title of the conversation, derived from the question when it was untitled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_title: Option<String>,
}
