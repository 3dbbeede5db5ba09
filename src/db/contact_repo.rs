// src/db/contact_repo.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{common::error::AppError, models::contact::Contact, models::funnel::DefaultFunnelEntry};

// O repositório de contatos, responsável por todas as interações com a tabela 'contacts'
#[derive(Clone)]
pub struct ContactRepository {
    pool: PgPool,
}

impl ContactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Busca um contato pelo identificador externo do provedor
    pub async fn find_by_wa_id(&self, organization_id: Uuid, wa_id: &str) -> Result<Option<Contact>, AppError> {
        let contact = sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE organization_id = $1 AND wa_id = $2",
        )
        .bind(organization_id)
        .bind(wa_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(contact)
    }

    /// Insert-or-get atômico sobre o índice único (organization_id, wa_id).
    ///
    /// Dois webhooks simultâneos para um wa_id novo disputam o mesmo INSERT:
    /// um cria, o outro cai no ON CONFLICT e recebe a mesma linha de volta.
    /// O funil padrão só é atribuído na criação; o conflito não mexe nele.
    pub async fn insert_or_get(
        &self,
        organization_id: Uuid,
        wa_id: &str,
        push_name: Option<&str>,
        funnel: Option<&DefaultFunnelEntry>,
    ) -> Result<Contact, AppError> {
        let contact = sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO contacts (organization_id, wa_id, phone, push_name, funnel_id, funnel_stage_id, last_interaction_at)
            VALUES ($1, $2, $2, $3, $4, $5, NOW())
            ON CONFLICT (organization_id, wa_id) DO UPDATE SET
                push_name = CASE
                    WHEN contacts.name IS NULL AND EXCLUDED.push_name IS NOT NULL THEN EXCLUDED.push_name
                    ELSE contacts.push_name
                END,
                last_interaction_at = NOW(),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(organization_id)
        .bind(wa_id)
        .bind(push_name)
        .bind(funnel.map(|f| f.funnel_id))
        .bind(funnel.and_then(|f| f.stage_id))
        .fetch_one(&self.pool)
        .await?;

        Ok(contact)
    }

    /// Preenche o push_name enquanto o time ainda não digitou um nome.
    /// Um nome digitado (`name`) nunca é sobrescrito pelo pipeline.
    pub async fn apply_push_name_backfill(
        &self,
        contact_id: Uuid,
        push_name: Option<&str>,
    ) -> Result<Contact, AppError> {
        let contact = sqlx::query_as::<_, Contact>(
            r#"
            UPDATE contacts SET
                push_name = CASE
                    WHEN name IS NULL AND $2::text IS NOT NULL THEN $2::text
                    ELSE push_name
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(contact_id)
        .bind(push_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(contact)
    }

    // Carimba a última interação (chamado a cada mensagem recebida)
    pub async fn touch_last_interaction(&self, contact_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE contacts SET last_interaction_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(contact_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
