// src/models/contact.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Âncora de identidade de um participante externo do chat.
/// No máximo um registro por (organização, wa_id) — índice único no banco.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub organization_id: Uuid,

    /// Identificador estável do provedor (derivado do telefone)
    pub wa_id: String,

    /// Nome digitado pelo time. O pipeline NUNCA sobrescreve este campo.
    pub name: Option<String>,
    /// Nome de exibição reportado pelo WhatsApp; só serve de fallback.
    pub push_name: Option<String>,
    pub phone: Option<String>,

    pub lead_score: i32,

    pub funnel_id: Option<Uuid>,
    pub funnel_stage_id: Option<Uuid>,

    pub last_interaction_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
