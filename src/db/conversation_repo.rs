// src/db/conversation_repo.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{common::error::AppError, models::conversation::Conversation};

#[derive(Clone)]
pub struct ConversationRepository {
    pool: PgPool,
}

impl ConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id_and_org(
        &self,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Conversation>, AppError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    // Busca a conversa não-terminal do contato (no máximo uma, por índice parcial)
    pub async fn find_open_for_contact(&self, contact_id: Uuid) -> Result<Option<Conversation>, AppError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT * FROM conversations
            WHERE contact_id = $1 AND status NOT IN ('RESOLVED', 'CLOSED')
            "#,
        )
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    /// Tenta abrir uma conversa nova (OPEN / AI_ASSISTED).
    ///
    /// Retorna None quando outra requisição abriu a conversa primeiro: o
    /// ON CONFLICT sobre o índice parcial garante que nunca existem duas
    /// conversas abertas para o mesmo contato.
    pub async fn insert_open(
        &self,
        organization_id: Uuid,
        contact_id: Uuid,
    ) -> Result<Option<Conversation>, AppError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (organization_id, contact_id, status, mode)
            VALUES ($1, $2, 'OPEN', 'AI_ASSISTED')
            ON CONFLICT (contact_id) WHERE status NOT IN ('RESOLVED', 'CLOSED') DO NOTHING
            RETURNING *
            "#,
        )
        .bind(organization_id)
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    /// Efeitos colaterais de uma mensagem recebida: contador, carimbo e
    /// transição para WAITING_AGENT — exceto quando um humano já está
    /// atendendo (modo HUMAN_ONLY com status IN_PROGRESS).
    pub async fn register_inbound_message(&self, conversation_id: Uuid) -> Result<Conversation, AppError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations SET
                message_count = message_count + 1,
                last_message_at = NOW(),
                status = CASE
                    WHEN mode = 'HUMAN_ONLY' AND status = 'IN_PROGRESS' THEN status
                    ELSE 'WAITING_AGENT'
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(conversation)
    }

    // Efeitos colaterais de uma mensagem enviada pelo time
    pub async fn register_outbound_message(&self, conversation_id: Uuid) -> Result<Conversation, AppError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations SET
                message_count = message_count + 1,
                last_message_at = NOW(),
                status = 'WAITING_CLIENT',
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(conversation)
    }
}
