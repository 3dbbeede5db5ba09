// src/models/conversation.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// Mapeia o CREATE TYPE conversation_status do banco
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "conversation_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationStatus {
    Open,
    WaitingClient,
    WaitingAgent,
    InProgress,
    Resolved,
    Closed,
}

impl ConversationStatus {
    /// RESOLVED e CLOSED encerram a conversa; todo o resto conta como aberta.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversationStatus::Resolved | ConversationStatus::Closed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "conversation_mode", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationMode {
    AiAssisted,
    HumanOnly,
    AiOnly,
}

/// Sessão de diálogo entre a organização e um contato.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub contact_id: Uuid,

    pub status: ConversationStatus,
    pub mode: ConversationMode,

    pub message_count: i32,
    pub last_message_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(ConversationStatus::Resolved.is_terminal());
        assert!(ConversationStatus::Closed.is_terminal());
        assert!(!ConversationStatus::Open.is_terminal());
        assert!(!ConversationStatus::WaitingAgent.is_terminal());
        assert!(!ConversationStatus::InProgress.is_terminal());
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&ConversationStatus::WaitingAgent).unwrap();
        assert_eq!(json, "\"WAITING_AGENT\"");
        let json = serde_json::to_string(&ConversationMode::AiAssisted).unwrap();
        assert_eq!(json, "\"AI_ASSISTED\"");
    }
}
