// src/models/funnel.rs

use sqlx::FromRow;
use uuid::Uuid;

/// Destino da atribuição automática de funil para contatos novos:
/// o funil padrão da organização e sua primeira etapa (se houver).
/// A gestão dos funis em si fica na camada CRUD.
#[derive(Debug, Clone, FromRow)]
pub struct DefaultFunnelEntry {
    pub funnel_id: Uuid,
    pub stage_id: Option<Uuid>,
}
