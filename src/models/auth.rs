// src/models/auth.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Estrutura de dados ("claims") dentro do JWT emitido pelo serviço de auth.
// Este backend só VERIFICA tokens; a emissão fica fora daqui.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid, // Subject (ID do usuário)
    pub org: Uuid, // Organização do usuário
    pub exp: usize, // Expiration time (quando o token expira)
    pub iat: usize, // Issued At (quando o token foi criado)
}

/// Identidade autenticada injetada nas requisições pelo auth_guard.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub org_id: Uuid,
}
