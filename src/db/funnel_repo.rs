// src/db/funnel_repo.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{common::error::AppError, models::funnel::DefaultFunnelEntry};

#[derive(Clone)]
pub struct FunnelRepository {
    pool: PgPool,
}

impl FunnelRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Funil padrão da organização + sua primeira etapa (por stage_order).
    /// Ausência de funil padrão não é erro: a atribuição é best-effort.
    pub async fn find_default_entry(
        &self,
        organization_id: Uuid,
    ) -> Result<Option<DefaultFunnelEntry>, AppError> {
        let entry = sqlx::query_as::<_, DefaultFunnelEntry>(
            r#"
            SELECT f.id AS funnel_id, s.id AS stage_id
            FROM funnels f
            LEFT JOIN LATERAL (
                SELECT id FROM funnel_stages
                WHERE funnel_id = f.id
                ORDER BY stage_order ASC
                LIMIT 1
            ) s ON TRUE
            WHERE f.organization_id = $1 AND f.is_default = TRUE
            LIMIT 1
            "#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }
}
