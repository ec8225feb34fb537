use std::sync::Arc;

use actix_web::{delete, get, post, put, web};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::conversation::DEFAULT_TITLE;
use crate::models::{Conversation, Message};
use crate::types::{
    ConversationSummary, MessageView, NewConversationResponse, RenameConversationRequest,
    StatusResponse,
};
use crate::AppState;

/// Loads a conversation and checks that the caller owns it.
pub(crate) async fn owned_conversation(
    pool: &SqlitePool,
    conversation_id: Uuid,
    authenticated_user: &AuthenticatedUser,
) -> Result<Conversation, ApiError> {
    let conversation = Conversation::get(pool, conversation_id)
        .await?
        .ok_or(ApiError::NotFound("Conversation"))?;

    if conversation.user_id != authenticated_user.user_id {
        warn!(
            "User {} tried to access conversation {} owned by {}",
            authenticated_user.user_id, conversation.id, conversation.user_id
        );
        return Err(ApiError::Forbidden);
    }

    Ok(conversation)
}

#[utoipa::path(
    get,
    path = "/api/conversations",
    tag = "conversations",
    responses(
        (status = 200, body = [ConversationSummary], description = "Most recent first"),
        (status = 401, body = StatusResponse),
    )
)]
#[get("/conversations")]
pub async fn list_conversations(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<web::Json<Vec<ConversationSummary>>, ApiError> {
    let conversations = Conversation::list_for_user(&app_state.pool, authenticated_user.user_id).await?;

    Ok(web::Json(
        conversations.into_iter().map(ConversationSummary::from).collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/api/conversation/new",
    tag = "conversations",
    responses(
        (status = 200, body = NewConversationResponse),
        (status = 401, body = StatusResponse),
    )
)]
#[post("/conversation/new")]
pub async fn new_conversation(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
) -> Result<web::Json<NewConversationResponse>, ApiError> {
    let conversation =
        Conversation::create(&app_state.pool, authenticated_user.user_id, DEFAULT_TITLE).await?;

    info!(
        "User {} opened conversation {}",
        authenticated_user.user_id, conversation.id
    );
    Ok(web::Json(NewConversationResponse {
        success: true,
        id: conversation.id,
    }))
}

#[utoipa::path(
    get,
    path = "/api/conversation/{conversation_id}",
    tag = "conversations",
    params(("conversation_id" = Uuid, Path)),
    responses(
        (status = 200, body = [MessageView], description = "Chronological order"),
        (status = 401, body = StatusResponse),
        (status = 403, body = StatusResponse),
        (status = 404, body = StatusResponse),
    )
)]
#[get("/conversation/{conversation_id}")]
pub async fn get_conversation_messages(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    conversation_id: web::Path<Uuid>,
) -> Result<web::Json<Vec<MessageView>>, ApiError> {
    let conversation =
        owned_conversation(&app_state.pool, conversation_id.into_inner(), &authenticated_user).await?;

    let messages = Message::list_for_conversation(&app_state.pool, conversation.id).await?;
    Ok(web::Json(messages.into_iter().map(MessageView::from).collect()))
}

#[utoipa::path(
    put,
    path = "/api/conversation/rename/{conversation_id}",
    tag = "conversations",
    params(("conversation_id" = Uuid, Path)),
    request_body = RenameConversationRequest,
    responses(
        (status = 200, body = StatusResponse),
        (status = 400, body = StatusResponse),
        (status = 403, body = StatusResponse),
        (status = 404, body = StatusResponse),
    )
)]
#[put("/conversation/rename/{conversation_id}")]
pub async fn rename_conversation(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    conversation_id: web::Path<Uuid>,
    web::Json(rename_request): web::Json<RenameConversationRequest>,
) -> Result<web::Json<StatusResponse>, ApiError> {
    let title = rename_request.title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("Title must not be empty".to_string()));
    }

    let conversation =
        owned_conversation(&app_state.pool, conversation_id.into_inner(), &authenticated_user).await?;

    Conversation::update_title(&app_state.pool, conversation.id, title).await?;
    Ok(web::Json(StatusResponse::ok()))
}

#[utoipa::path(
    delete,
    path = "/api/conversation/delete/{conversation_id}",
    tag = "conversations",
    params(("conversation_id" = Uuid, Path)),
    responses(
        (status = 200, body = StatusResponse),
        (status = 403, body = StatusResponse),
        (status = 404, body = StatusResponse),
    )
)]
#[delete("/conversation/delete/{conversation_id}")]
pub async fn delete_conversation(
    app_state: web::Data<Arc<AppState>>,
    authenticated_user: AuthenticatedUser,
    conversation_id: web::Path<Uuid>,
) -> Result<web::Json<StatusResponse>, ApiError> {
    let conversation =
        owned_conversation(&app_state.pool, conversation_id.into_inner(), &authenticated_user).await?;

    Conversation::delete(&app_state.pool, conversation.id).await?;
    app_state.orchestrator.forget(conversation.id).await;

    info!(
        "User {} deleted conversation {}",
        authenticated_user.user_id, conversation.id
    );
    Ok(web::Json(StatusResponse::ok()))
}
