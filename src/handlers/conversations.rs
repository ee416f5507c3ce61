use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;

use crate::errors::AppError;
use crate::models::{Conversation, Message};
use crate::services::orchestrator::MessageExchange;
use crate::state::AppState;

// GET /api/conversations
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Conversation>>, AppError> {
    let conversations = state
        .store
        .get_user_conversations(state.config.default_user_id)
        .await?;
    Ok(Json(conversations))
}

// POST /api/conversations
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Conversation>, AppError> {
    let title = required_string(payload, "title", "Invalid conversation data")?;

    let conversation = state
        .store
        .create_conversation(state.config.default_user_id, &title)
        .await?;
    tracing::info!(conversation_id = conversation.id, "conversation created");
    Ok(Json(conversation))
}

// GET /api/conversations/:id/messages
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<i64>,
) -> Result<Json<Vec<Message>>, AppError> {
    owned_conversation(&state, conversation_id).await?;
    let messages = state.store.get_conversation_messages(conversation_id).await?;
    Ok(Json(messages))
}

// POST /api/conversations/:id/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<i64>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<MessageExchange>, AppError> {
    let content = required_string(payload, "content", "Message content is required")?;
    owned_conversation(&state, conversation_id).await?;

    let exchange = state
        .orchestrator
        .handle_user_message(state.config.default_user_id, conversation_id, &content)
        .await?;
    Ok(Json(exchange))
}

async fn owned_conversation(state: &AppState, id: i64) -> Result<Conversation, AppError> {
    state
        .store
        .get_conversation(id)
        .await?
        .filter(|c| c.user_id == state.config.default_user_id)
        .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))
}

/// Pulls a non-blank string field out of a JSON body, unmodified; anything else is a 400.
fn required_string(
    payload: Result<Json<Value>, JsonRejection>,
    field: &str,
    message: &str,
) -> Result<String, AppError> {
    let Json(body) = payload.map_err(|e| {
        tracing::debug!(error = %e, "rejected request body");
        AppError::BadRequest(message.to_string())
    })?;

    body.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest(message.to_string()))
}
