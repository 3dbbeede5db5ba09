// src/db/connection_repo.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::connection::{ConnectionStatus, WhatsAppConnection},
};

#[derive(Clone)]
pub struct ConnectionRepository {
    pool: PgPool,
}

impl ConnectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // O webhook chega endereçado pelo id da conexão, não pela organização
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<WhatsAppConnection>, AppError> {
        let connection = sqlx::query_as::<_, WhatsAppConnection>(
            "SELECT * FROM whatsapp_connections WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(connection)
    }

    pub async fn find_by_org(&self, organization_id: Uuid) -> Result<Option<WhatsAppConnection>, AppError> {
        let connection = sqlx::query_as::<_, WhatsAppConnection>(
            "SELECT * FROM whatsapp_connections WHERE organization_id = $1",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(connection)
    }

    // Usado para dar nome à instância provisionada no provedor
    pub async fn find_org_name(&self, organization_id: Uuid) -> Result<Option<String>, AppError> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM organizations WHERE id = $1")
            .bind(organization_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(name)
    }

    /// Grava (ou regrava) a conexão da organização com um token validado.
    ///
    /// Só é chamado DEPOIS que o provedor confirmou o token: nunca fica
    /// no banco uma conexão pela metade com token inutilizável.
    pub async fn upsert_provisioned(
        &self,
        organization_id: Uuid,
        uazapi_instance: Option<&str>,
        uazapi_token: &str,
        status: ConnectionStatus,
        phone_number: Option<&str>,
        display_name: Option<&str>,
    ) -> Result<WhatsAppConnection, AppError> {
        let connection = sqlx::query_as::<_, WhatsAppConnection>(
            r#"
            INSERT INTO whatsapp_connections
                (organization_id, uazapi_instance, uazapi_token, status, phone_number, display_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (organization_id) DO UPDATE SET
                uazapi_instance = EXCLUDED.uazapi_instance,
                uazapi_token = EXCLUDED.uazapi_token,
                status = EXCLUDED.status,
                phone_number = COALESCE(EXCLUDED.phone_number, whatsapp_connections.phone_number),
                display_name = COALESCE(EXCLUDED.display_name, whatsapp_connections.display_name),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(organization_id)
        .bind(uazapi_instance)
        .bind(uazapi_token)
        .bind(status)
        .bind(phone_number)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(connection)
    }

    pub async fn set_status(
        &self,
        organization_id: Uuid,
        status: ConnectionStatus,
    ) -> Result<Option<WhatsAppConnection>, AppError> {
        let connection = sqlx::query_as::<_, WhatsAppConnection>(
            "UPDATE whatsapp_connections SET status = $2, updated_at = NOW() WHERE organization_id = $1 RETURNING *",
        )
        .bind(organization_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        Ok(connection)
    }

    pub async fn mark_connected(
        &self,
        organization_id: Uuid,
        phone_number: Option<&str>,
        display_name: Option<&str>,
        profile_pic_url: Option<&str>,
    ) -> Result<Option<WhatsAppConnection>, AppError> {
        let connection = sqlx::query_as::<_, WhatsAppConnection>(
            r#"
            UPDATE whatsapp_connections SET
                status = 'CONNECTED',
                phone_number = COALESCE($2, phone_number),
                display_name = COALESCE($3, display_name),
                profile_pic_url = COALESCE($4, profile_pic_url),
                last_connected_at = NOW(),
                updated_at = NOW()
            WHERE organization_id = $1
            RETURNING *
            "#,
        )
        .bind(organization_id)
        .bind(phone_number)
        .bind(display_name)
        .bind(profile_pic_url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(connection)
    }

    /// Desconexão local: sempre aplica, independente do provedor.
    pub async fn mark_disconnected(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<WhatsAppConnection>, AppError> {
        let connection = sqlx::query_as::<_, WhatsAppConnection>(
            r#"
            UPDATE whatsapp_connections SET
                status = 'DISCONNECTED',
                last_disconnected_at = NOW(),
                updated_at = NOW()
            WHERE organization_id = $1
            RETURNING *
            "#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(connection)
    }

    // Transição vinda do webhook connection.update, endereçada por id
    pub async fn update_status_by_id(
        &self,
        id: Uuid,
        status: ConnectionStatus,
    ) -> Result<Option<WhatsAppConnection>, AppError> {
        let connection = sqlx::query_as::<_, WhatsAppConnection>(
            r#"
            UPDATE whatsapp_connections SET
                status = $2,
                last_connected_at = CASE WHEN $2 = 'CONNECTED' THEN NOW() ELSE last_connected_at END,
                last_disconnected_at = CASE WHEN $2 = 'DISCONNECTED' THEN NOW() ELSE last_disconnected_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        Ok(connection)
    }
}
