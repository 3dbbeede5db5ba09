// src/models/message.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "message_direction", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "message_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    Image,
    Audio,
    Video,
    Document,
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Text
    }
}

/// Entrada imutável do ledger. Só o status (e seus carimbos) muda depois
/// de criada; nunca é apagada.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub conversation_id: Uuid,

    /// Id externo do provedor; único por organização quando presente.
    pub wa_message_id: Option<String>,

    pub direction: MessageDirection,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub message_type: MessageType,

    pub content: String,
    pub media_url: Option<String>,
    pub caption: Option<String>,
    pub is_ai_generated: bool,

    /// TEXT no banco: estados fora do catálogo do provedor são guardados
    /// como vieram (ver `status`).
    pub status: String,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

/// Ordem monotônica de status de entrega.
///
/// PENDING < SENT < DELIVERED < READ, com FAILED como estado absorvente
/// alcançável a partir de qualquer estado não-READ. Uma atualização que
/// regrediria a ordem é descartada, não aplicada.
pub mod status {
    pub const PENDING: &str = "PENDING";
    pub const SENT: &str = "SENT";
    pub const DELIVERED: &str = "DELIVERED";
    pub const READ: &str = "READ";
    pub const FAILED: &str = "FAILED";

    /// Converte o status cru do provedor para o valor canônico.
    /// Retorna também se o valor foi reconhecido: valores desconhecidos
    /// são guardados como vieram (maiúsculos), mas sinalizados no log.
    pub fn map_raw(raw: &str) -> (String, bool) {
        match raw.to_ascii_lowercase().as_str() {
            "sent" => (SENT.to_string(), true),
            "delivered" => (DELIVERED.to_string(), true),
            "read" | "played" => (READ.to_string(), true),
            "failed" => (FAILED.to_string(), true),
            "pending" => (PENDING.to_string(), true),
            _ => (raw.to_ascii_uppercase(), false),
        }
    }

    /// Posição na ordem total; None para FAILED e valores desconhecidos.
    pub fn rank(status: &str) -> Option<i32> {
        match status {
            PENDING => Some(0),
            SENT => Some(1),
            DELIVERED => Some(2),
            READ => Some(3),
            _ => None,
        }
    }

    /// Decide se `next` pode substituir `current` sem violar a ordem.
    pub fn advances(current: &str, next: &str) -> bool {
        // FAILED é terminal: nada sai dele.
        if current == FAILED {
            return false;
        }
        // FAILED entra de qualquer estado não-READ.
        if next == FAILED {
            return current != READ;
        }
        match (rank(current), rank(next)) {
            (Some(cur), Some(nxt)) => nxt > cur,
            // Valor desconhecido: sem posição na ordem, só entra enquanto a
            // mensagem não atingiu um estado protegido (READ/FAILED).
            (Some(_), None) => current != READ,
            // Status atual desconhecido: aceita qualquer valor canônico.
            (None, Some(_)) => true,
            (None, None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::status::*;

    #[test]
    fn map_raw_canonical_values() {
        assert_eq!(map_raw("sent"), (SENT.to_string(), true));
        assert_eq!(map_raw("Delivered"), (DELIVERED.to_string(), true));
        assert_eq!(map_raw("read"), (READ.to_string(), true));
        assert_eq!(map_raw("played"), (READ.to_string(), true));
        assert_eq!(map_raw("FAILED"), (FAILED.to_string(), true));
    }

    #[test]
    fn map_raw_unknown_is_flagged_verbatim() {
        let (mapped, recognized) = map_raw("server_ack");
        assert_eq!(mapped, "SERVER_ACK");
        assert!(!recognized);
    }

    #[test]
    fn forward_transitions_advance() {
        assert!(advances(PENDING, SENT));
        assert!(advances(PENDING, DELIVERED));
        assert!(advances(SENT, DELIVERED));
        assert!(advances(DELIVERED, READ));
        assert!(advances(PENDING, READ));
    }

    #[test]
    fn regressive_transitions_are_dropped() {
        assert!(!advances(READ, DELIVERED));
        assert!(!advances(DELIVERED, SENT));
        assert!(!advances(SENT, SENT));
        assert!(!advances(READ, READ));
    }

    #[test]
    fn failed_is_absorbing_but_not_from_read() {
        assert!(advances(PENDING, FAILED));
        assert!(advances(SENT, FAILED));
        assert!(advances(DELIVERED, FAILED));
        assert!(!advances(READ, FAILED));
        assert!(!advances(FAILED, SENT));
        assert!(!advances(FAILED, READ));
        assert!(!advances(FAILED, FAILED));
    }

    #[test]
    fn final_status_is_max_regardless_of_order() {
        // READ chega antes de DELIVERED: o DELIVERED atrasado é descartado.
        let mut current = DELIVERED.to_string();
        for next in [READ, DELIVERED, SENT] {
            if advances(&current, next) {
                current = next.to_string();
            }
        }
        assert_eq!(current, READ);
    }

    #[test]
    fn unknown_status_respects_terminal_protection() {
        assert!(advances(SENT, "SERVER_ACK"));
        assert!(!advances(READ, "SERVER_ACK"));
        assert!(!advances(FAILED, "SERVER_ACK"));
        // E um canônico posterior ainda entra por cima do desconhecido.
        assert!(advances("SERVER_ACK", READ));
    }
}
