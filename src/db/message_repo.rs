// src/db/message_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::message::{Message, MessageType},
};

#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserção idempotente de mensagem recebida.
    ///
    /// Mensagens de entrada já chegaram no aparelho, então nascem DELIVERED.
    /// Retorna None quando o wa_message_id já existe na organização — o
    /// chamador devolve o registro existente em vez de errar (duplicata
    /// de webhook é sucesso, não erro).
    pub async fn insert_inbound(
        &self,
        organization_id: Uuid,
        conversation_id: Uuid,
        wa_message_id: &str,
        message_type: MessageType,
        content: &str,
    ) -> Result<Option<Message>, AppError> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (organization_id, conversation_id, wa_message_id, direction, type, content, status)
            VALUES ($1, $2, $3, 'INBOUND', $4, $5, 'DELIVERED')
            ON CONFLICT (organization_id, wa_message_id) WHERE wa_message_id IS NOT NULL DO NOTHING
            RETURNING *
            "#,
        )
        .bind(organization_id)
        .bind(conversation_id)
        .bind(wa_message_id)
        .bind(message_type)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    /// Mensagem de saída: nasce PENDING e sem id externo (o provedor só
    /// atribui o wa_message_id quando confirma o envio).
    pub async fn insert_outbound(
        &self,
        organization_id: Uuid,
        conversation_id: Uuid,
        message_type: MessageType,
        content: &str,
        media_url: Option<&str>,
        caption: Option<&str>,
    ) -> Result<Message, AppError> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (organization_id, conversation_id, direction, type, content, media_url, caption, status)
            VALUES ($1, $2, 'OUTBOUND', $3, $4, $5, $6, 'PENDING')
            RETURNING *
            "#,
        )
        .bind(organization_id)
        .bind(conversation_id)
        .bind(message_type)
        .bind(content)
        .bind(media_url)
        .bind(caption)
        .fetch_one(&self.pool)
        .await?;

        Ok(message)
    }

    pub async fn find_by_wa_message_id(
        &self,
        organization_id: Uuid,
        wa_message_id: &str,
    ) -> Result<Option<Message>, AppError> {
        let message = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE organization_id = $1 AND wa_message_id = $2",
        )
        .bind(organization_id)
        .bind(wa_message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    // Trava a linha da mensagem dentro da transação do ledger: a decisão
    // de avanço monotônico precisa ler e escrever sem corrida.
    pub async fn find_by_wa_id_for_update<'e, E>(
        &self,
        executor: E,
        organization_id: Uuid,
        wa_message_id: &str,
    ) -> Result<Option<Message>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let message = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE organization_id = $1 AND wa_message_id = $2 FOR UPDATE",
        )
        .bind(organization_id)
        .bind(wa_message_id)
        .fetch_optional(executor)
        .await?;

        Ok(message)
    }

    pub async fn update_status<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        status: &str,
    ) -> Result<Message, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let message = sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages SET
                status = $2,
                delivered_at = CASE WHEN $2 = 'DELIVERED' THEN NOW() ELSE delivered_at END,
                read_at = CASE WHEN $2 = 'READ' THEN NOW() ELSE read_at END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_one(executor)
        .await?;

        Ok(message)
    }
}
