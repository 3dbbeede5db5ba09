// src/handlers/conversations.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    models::{auth::CurrentUser, message::MessageType, realtime::RealtimeEvent},
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    #[validate(length(min = 1, message = "O conteúdo da mensagem é obrigatório."))]
    #[schema(example = "Olá! Segue o orçamento.")]
    pub content: String,

    #[serde(default, rename = "type")]
    pub message_type: MessageType,

    pub media_url: Option<String>,
    pub caption: Option<String>,
}

// POST /api/conversations/{id}/messages
//
// Fronteira com a camada CRUD: entrada do record_outbound do ledger.
#[utoipa::path(
    post,
    path = "/api/conversations/{id}/messages",
    tag = "Conversas",
    request_body = SendMessagePayload,
    params(
        ("id" = Uuid, Path, description = "Id da conversa")
    ),
    responses(
        (status = 201, description = "Mensagem registrada (PENDING)", body = crate::models::message::Message),
        (status = 404, description = "Conversa não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn send_message(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let conversation = app_state
        .ledger_service
        .find_conversation(user.org_id, id)
        .await?
        .ok_or(AppError::ConversationNotFound)?;

    let (message, updated) = app_state
        .ledger_service
        .record_outbound(
            &conversation,
            payload.message_type,
            &payload.content,
            payload.media_url.as_deref(),
            payload.caption.as_deref(),
        )
        .await?;

    app_state.realtime.publish(
        user.org_id,
        RealtimeEvent::MessageNew {
            conversation_id: conversation.id,
            message: message.clone(),
        },
    );
    app_state.realtime.publish(
        user.org_id,
        RealtimeEvent::ConversationUpdate {
            conversation_id: conversation.id,
            updates: json!({
                "status": updated.status,
                "messageCount": updated.message_count,
                "lastMessageAt": updated.last_message_at,
            }),
        },
    );

    Ok((StatusCode::CREATED, Json(json!({ "success": true, "data": message }))))
}
