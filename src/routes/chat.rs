use std::sync::Arc;

use actix_web::{post, web};
use sqlx::SqlitePool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::conversation::title_from_message;
use crate::models::{Conversation, Message};
use crate::orchestrator::Reply;
use crate::prompts::Prompts;
use crate::routes::conversation::owned_conversation;
use crate::types::{ChatRequest, ChatResponse, StatusResponse};
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "chat",
    request_body = ChatRequest,
    responses(
        (status = 200, body = ChatResponse, description = "HTML reply, or the apology when the model failed"),
        (status = 400, body = StatusResponse),
        (status = 401, body = StatusResponse),
        (status = 403, body = StatusResponse),
        (status = 404, body = StatusResponse),
    )
)]
#[post("/chat")]
pub async fn chat(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    web::Json(chat_request): web::Json<ChatRequest>,
) -> Result<web::Json<ChatResponse>, ApiError> {
    let text = chat_request.message.as_deref().unwrap_or_default().trim();
    if text.is_empty() {
        return Ok(web::Json(ChatResponse {
            response: Prompts::EMPTY_QUESTION.to_string(),
            conversation_id: None,
            new_title: None,
        }));
    }

    let pool = &app_state.pool;
    let mut conversation = match chat_request.conversation_id {
        Some(conversation_id) => {
            owned_conversation(pool, conversation_id, &authenticated_user).await?
        }
        None => {
            let conversation =
                Conversation::create(pool, authenticated_user.user_id, &title_from_message(text))
                    .await?;
            info!(
                "Started conversation {} for {}",
                conversation.id, authenticated_user.username
            );
            conversation
        }
    };

    let reply = app_state.orchestrator.reply(pool, conversation.id, text).await;
    if reply.answered {
        store_turn(pool, conversation.id, text, &reply).await?;

        if conversation.has_default_title() {
            conversation.title = title_from_message(text);
            Conversation::update_title(pool, conversation.id, &conversation.title).await?;
        }
    }

    Ok(web::Json(ChatResponse {
        response: reply.content,
        conversation_id: Some(conversation.id),
        new_title: Some(conversation.title),
    }))
}

/// Persists an answered turn. A conversation deleted while the model was answering is reported
/// as gone rather than as a server fault.
pub(crate) async fn store_turn(
    pool: &SqlitePool,
    conversation_id: Uuid,
    text: &str,
    reply: &Reply,
) -> Result<(), ApiError> {
    Message::save_turn(pool, conversation_id, text, &reply.content, &reply.markdown)
        .await
        .map_err(|e| match e.downcast_ref::<sqlx::Error>() {
            Some(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                warn!("Conversation {} was deleted mid-turn", conversation_id);
                ApiError::NotFound("Conversation")
            }
            _ => {
                error!("Failed to store turn in conversation {}: {:?}", conversation_id, e);
                ApiError::Internal(e)
            }
        })?;

    Ok(())
}
