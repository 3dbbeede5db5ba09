// src/models/realtime.rs

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::models::connection::ConnectionStatus;
use crate::models::message::Message;

/// Evento de domínio publicado para os assinantes realtime da organização.
///
/// O envelope no socket é `{"event": "...", "data": {...}}`, com os nomes
/// de evento que o app mobile já consome (`message:new` etc).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum RealtimeEvent {
    #[serde(rename = "message:new", rename_all = "camelCase")]
    MessageNew {
        conversation_id: Uuid,
        message: Message,
    },

    #[serde(rename = "conversation:update", rename_all = "camelCase")]
    ConversationUpdate {
        conversation_id: Uuid,
        updates: Value,
    },

    #[serde(rename = "connection:update", rename_all = "camelCase")]
    ConnectionUpdate {
        status: ConnectionStatus,
        phone_number: Option<String>,
        display_name: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_uses_event_and_data() {
        let event = RealtimeEvent::ConversationUpdate {
            conversation_id: Uuid::nil(),
            updates: json!({ "status": "WAITING_AGENT" }),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "conversation:update");
        assert_eq!(value["data"]["updates"]["status"], "WAITING_AGENT");
    }

    #[test]
    fn connection_update_serializes_camel_case() {
        let event = RealtimeEvent::ConnectionUpdate {
            status: ConnectionStatus::Connected,
            phone_number: Some("5511999990000".into()),
            display_name: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "connection:update");
        assert_eq!(value["data"]["phoneNumber"], "5511999990000");
        assert_eq!(value["data"]["status"], "CONNECTED");
    }
}
