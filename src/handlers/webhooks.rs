// src/handlers/webhooks.rs

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    models::realtime::RealtimeEvent,
    services::normalizer::{self, CanonicalEvent, InboundMessageEvent},
};

// POST /api/webhooks/uazapi/{connection_id}
//
// O provedor não entende códigos semânticos: 404 só para conexão
// desconhecida, 200 para todo o resto. Falha de negócio é logada, nunca
// devolvida — repetir o webhook não mudaria o payload.
#[utoipa::path(
    post,
    path = "/api/webhooks/uazapi/{connection_id}",
    tag = "Webhooks",
    params(
        ("connection_id" = Uuid, Path, description = "Id da conexão que recebeu o evento")
    ),
    responses(
        (status = 200, description = "Evento aceito"),
        (status = 404, description = "Conexão desconhecida")
    )
)]
pub async fn uazapi_webhook(
    State(app_state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let Some(connection) = app_state
        .connection_service
        .find_by_connection_id(connection_id)
        .await?
    else {
        tracing::warn!(%connection_id, "Webhook para conexão desconhecida");
        return Err(AppError::ConnectionNotFound);
    };

    let organization_id = connection.organization_id;

    match normalizer::normalize(&payload) {
        Err(rejected) => {
            // Payload que não rende registro completo: descarta e conta
            metrics::counter!("watson_webhook_rejected_total").increment(1);
            tracing::warn!(%organization_id, reason = %rejected.reason, "Payload de webhook inválido");
        }
        Ok(CanonicalEvent::InboundMessage(event)) => {
            if let Err(err) = process_inbound(&app_state, organization_id, &event).await {
                tracing::error!(%organization_id, error = %err, "Erro processando mensagem recebida");
            }
        }
        Ok(CanonicalEvent::StatusUpdate(event)) => {
            if let Err(err) = app_state
                .ledger_service
                .apply_status_update(organization_id, &event)
                .await
            {
                tracing::error!(%organization_id, error = %err, "Erro processando atualização de status");
            }
        }
        Ok(CanonicalEvent::ConnectionStateChanged { raw_state }) => {
            if let Err(err) = app_state
                .connection_service
                .apply_webhook_state(&connection, &raw_state)
                .await
            {
                tracing::error!(%organization_id, error = %err, "Erro processando atualização de conexão");
            }
        }
        Ok(CanonicalEvent::Unrecognized { event_type }) => {
            metrics::counter!("watson_webhook_unrecognized_total").increment(1);
            tracing::info!(?event_type, "Tipo de evento de webhook não tratado");
        }
    }

    Ok(Json(json!({ "success": true })))
}

// Ingestão completa de uma mensagem recebida: identidade -> ledger -> fanout
async fn process_inbound(
    app_state: &AppState,
    organization_id: Uuid,
    event: &InboundMessageEvent,
) -> Result<(), AppError> {
    let (_contact, conversation) = app_state
        .identity_service
        .resolve(organization_id, &event.external_chat_id, event.push_name.as_deref())
        .await?;

    let (message, updated_conversation) = app_state
        .ledger_service
        .record_inbound(&conversation, event)
        .await?;

    // Duplicata não re-emite eventos nem refaz efeitos colaterais
    if let Some(updated) = updated_conversation {
        app_state.realtime.publish(
            organization_id,
            RealtimeEvent::MessageNew {
                conversation_id: conversation.id,
                message: message.clone(),
            },
        );
        app_state.realtime.publish(
            organization_id,
            RealtimeEvent::ConversationUpdate {
                conversation_id: conversation.id,
                updates: json!({
                    "status": updated.status,
                    "messageCount": updated.message_count,
                    "lastMessageAt": updated.last_message_at,
                }),
            },
        );
    }

    tracing::info!(
        conversation_id = %conversation.id,
        message_id = %message.id,
        "Mensagem processada"
    );

    Ok(())
}
