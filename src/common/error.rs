use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Token inválido")]
    InvalidToken,

    #[error("Conexão não encontrada")]
    ConnectionNotFound,

    #[error("Conversa não encontrada")]
    ConversationNotFound,

    // O usuário ainda não passou pelo setup/provisionamento do WhatsApp
    #[error("Conexão WhatsApp não configurada")]
    ConnectionNotConfigured,

    #[error("Token Uazapi inválido")]
    InvalidProviderToken,

    // Sem UAZAPI_ADMIN_TOKEN não há como provisionar instâncias novas
    #[error("Credencial de administrador do provedor ausente")]
    MissingAdminCredential,

    // Timeout/5xx do provedor em provisionamento, pareamento ou disconnect
    #[error("Provedor WhatsApp indisponível: {0}")]
    ProviderUnavailable(String),

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            // Retorna todos os detalhes da validação.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors.iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "Token de autenticação inválido ou ausente."),
            AppError::ConnectionNotFound => (StatusCode::NOT_FOUND, "Conexão não encontrada."),
            AppError::ConversationNotFound => (StatusCode::NOT_FOUND, "Conversa não encontrada."),
            AppError::ConnectionNotConfigured => (
                StatusCode::BAD_REQUEST,
                "Conexão WhatsApp não configurada. Configure o token Uazapi primeiro.",
            ),
            AppError::InvalidProviderToken => (StatusCode::BAD_REQUEST, "Token Uazapi inválido."),
            AppError::MissingAdminCredential => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Credencial de administrador do Uazapi não configurada no servidor.",
            ),
            AppError::ProviderUnavailable(ref detail) => {
                tracing::error!("Provedor WhatsApp indisponível: {}", detail);
                (StatusCode::BAD_GATEWAY, "Erro ao comunicar com o provedor WhatsApp.")
            }

            // Todos os outros erros (DatabaseError, InternalServerError) viram 500.
            // O `tracing` vai logar a mensagem detalhada que `thiserror` nos deu.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Ocorreu um erro inesperado.")
            }
        };

        // Resposta padrão para erros simples que só têm uma mensagem.
        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
