// src/models/connection.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// Mapeia o CREATE TYPE connection_status do banco
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "connection_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Sessão WhatsApp da organização (0 ou 1 por organização).
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppConnection {
    pub id: Uuid,
    pub organization_id: Uuid,

    pub status: ConnectionStatus,

    pub uazapi_instance: Option<String>,
    // IMPORTANTE para segurança: o token nunca sai na API
    #[serde(skip_serializing)]
    pub uazapi_token: Option<String>,

    pub phone_number: Option<String>,
    pub display_name: Option<String>,
    pub profile_pic_url: Option<String>,

    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_disconnected_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WhatsAppConnection {
    /// Token utilizável = não nulo e não vazio.
    pub fn usable_token(&self) -> Option<&str> {
        self.uazapi_token.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Resposta do GET /api/whatsapp/status.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatusView {
    pub status: ConnectionStatus,
    pub has_connection: bool,
    pub phone_number: Option<String>,
    pub display_name: Option<String>,
    pub profile_pic_url: Option<String>,
    pub qrcode: Option<String>,
    pub pairing_code: Option<String>,
}

impl ConnectionStatusView {
    /// Organização que nunca configurou WhatsApp.
    pub fn absent() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            has_connection: false,
            phone_number: None,
            display_name: None,
            profile_pic_url: None,
            qrcode: None,
            pairing_code: None,
        }
    }

    /// Visão a partir do registro local, sem dados vivos do provedor.
    pub fn from_local(connection: &WhatsAppConnection) -> Self {
        Self {
            status: connection.status,
            has_connection: true,
            phone_number: connection.phone_number.clone(),
            display_name: connection.display_name.clone(),
            profile_pic_url: connection.profile_pic_url.clone(),
            qrcode: None,
            pairing_code: None,
        }
    }
}

/// Resposta dos POST /api/whatsapp/connect/*: o artefato de pareamento é
/// transiente, vive só na resposta (não persiste além da janela).
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PairingView {
    pub status: ConnectionStatus,
    pub qrcode: Option<String>,
    pub pairing_code: Option<String>,
}
