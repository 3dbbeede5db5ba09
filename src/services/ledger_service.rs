// src/services/ledger_service.rs

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{ContactRepository, ConversationRepository, MessageRepository},
    models::{
        conversation::Conversation,
        message::{status, Message, MessageType},
    },
    services::normalizer::{InboundMessageEvent, StatusUpdateEvent},
};

/// Resultado de uma tentativa de atualização de status.
#[derive(Debug)]
pub enum StatusUpdateOutcome {
    Applied(Message),
    /// A atualização regrediria a ordem monotônica: descartada e contada.
    Regressive,
    /// Nenhuma mensagem com esse id externo na organização.
    UnknownMessage,
}

/// Ledger de mensagens: inserções idempotentes e reconciliação monotônica
/// de status.
#[derive(Clone)]
pub struct LedgerService {
    messages: MessageRepository,
    conversations: ConversationRepository,
    contacts: ContactRepository,
}

impl LedgerService {
    pub fn new(
        messages: MessageRepository,
        conversations: ConversationRepository,
        contacts: ContactRepository,
    ) -> Self {
        Self { messages, conversations, contacts }
    }

    pub async fn find_conversation(
        &self,
        organization_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<Conversation>, AppError> {
        self.conversations.find_by_id_and_org(conversation_id, organization_id).await
    }

    /// Registra uma mensagem recebida.
    ///
    /// Mensagens de entrada nascem DELIVERED (já chegaram no aparelho).
    /// Entrega duplicada do provedor (mesmo wa_message_id) devolve o
    /// registro existente sem efeitos colaterais — duplicata é sucesso.
    /// Retorna a conversa atualizada quando a inserção de fato aconteceu.
    pub async fn record_inbound(
        &self,
        conversation: &Conversation,
        event: &InboundMessageEvent,
    ) -> Result<(Message, Option<Conversation>), AppError> {
        let inserted = self
            .messages
            .insert_inbound(
                conversation.organization_id,
                conversation.id,
                &event.external_message_id,
                MessageType::Text,
                &event.content,
            )
            .await?;

        match inserted {
            Some(message) => {
                let updated = self.conversations.register_inbound_message(conversation.id).await?;
                self.contacts.touch_last_interaction(conversation.contact_id).await?;
                Ok((message, Some(updated)))
            }
            None => {
                metrics::counter!("watson_ingest_duplicate_total").increment(1);
                tracing::debug!(
                    wa_message_id = %event.external_message_id,
                    "Mensagem duplicada do provedor; devolvendo registro existente"
                );

                let existing = self
                    .messages
                    .find_by_wa_message_id(conversation.organization_id, &event.external_message_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::InternalServerError(anyhow::anyhow!(
                            "mensagem duplicada sumiu entre o conflito e a releitura"
                        ))
                    })?;

                Ok((existing, None))
            }
        }
    }

    /// Registra uma mensagem enviada pelo time: nasce PENDING, sem id
    /// externo (o provedor atribui na confirmação de envio).
    pub async fn record_outbound(
        &self,
        conversation: &Conversation,
        message_type: MessageType,
        content: &str,
        media_url: Option<&str>,
        caption: Option<&str>,
    ) -> Result<(Message, Conversation), AppError> {
        let message = self
            .messages
            .insert_outbound(
                conversation.organization_id,
                conversation.id,
                message_type,
                content,
                media_url,
                caption,
            )
            .await?;

        let updated = self.conversations.register_outbound_message(conversation.id).await?;

        Ok((message, updated))
    }

    /// Aplica uma atualização de status respeitando a ordem monotônica.
    ///
    /// O provedor re-tenta e reordena callbacks; a decisão de avanço roda
    /// com a linha travada (SELECT ... FOR UPDATE) para que duas
    /// atualizações simultâneas não se atropelem. Atualização regressiva
    /// é descartada em silêncio e contada, nunca virou erro.
    pub async fn apply_status_update(
        &self,
        organization_id: Uuid,
        event: &StatusUpdateEvent,
    ) -> Result<StatusUpdateOutcome, AppError> {
        let (mapped, recognized) = status::map_raw(&event.raw_status);
        if !recognized {
            metrics::counter!("watson_status_unmapped_total").increment(1);
            tracing::warn!(
                raw_status = %event.raw_status,
                "Status fora do catálogo do provedor; gravando valor como veio"
            );
        }

        let mut tx = self.messages.pool().begin().await?;

        let Some(current) = self
            .messages
            .find_by_wa_id_for_update(&mut *tx, organization_id, &event.external_message_id)
            .await?
        else {
            tracing::debug!(
                wa_message_id = %event.external_message_id,
                "Atualização de status para mensagem desconhecida"
            );
            return Ok(StatusUpdateOutcome::UnknownMessage);
        };

        if !status::advances(&current.status, &mapped) {
            metrics::counter!("watson_status_regressive_total").increment(1);
            tracing::debug!(
                wa_message_id = %event.external_message_id,
                current = %current.status,
                next = %mapped,
                "Atualização de status regressiva descartada"
            );
            return Ok(StatusUpdateOutcome::Regressive);
        }

        let updated = self.messages.update_status(&mut *tx, current.id, &mapped).await?;
        tx.commit().await?;

        Ok(StatusUpdateOutcome::Applied(updated))
    }
}
