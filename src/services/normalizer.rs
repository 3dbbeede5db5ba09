// src/services/normalizer.rs

//! Normalizador de eventos do webhook.
//!
//! O provedor já trocou de formato de payload algumas vezes (ex: o
//! remetente pode vir em `from` ou em `remoteJid`), então cada campo é
//! extraído por uma lista priorizada de regras puras: a primeira que
//! devolver algo não-vazio ganha. Parsing puro, sem efeito colateral.

use serde_json::Value;

const WA_SUFFIX: &str = "@s.whatsapp.net";

/// Mensagem recebida de um contato.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessageEvent {
    pub external_chat_id: String,
    pub content: String,
    pub external_message_id: String,
    pub push_name: Option<String>,
    pub timestamp: Option<i64>,
}

/// Mudança de status de entrega de uma mensagem já registrada.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdateEvent {
    pub external_message_id: String,
    pub raw_status: String,
}

/// União fechada de eventos canônicos que o pipeline entende.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalEvent {
    InboundMessage(InboundMessageEvent),
    StatusUpdate(StatusUpdateEvent),
    ConnectionStateChanged { raw_state: String },
    /// Tipo de evento fora do catálogo: logado e descartado, nunca re-tentado.
    Unrecognized { event_type: Option<String> },
}

/// Payload que não rende um registro completo. Nunca produzimos um
/// registro parcial: ou o evento sai inteiro, ou sai rejeitado.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedEvent {
    pub reason: String,
}

impl RejectedEvent {
    fn new(reason: &str) -> Self {
        Self { reason: reason.to_string() }
    }
}

type Rule = fn(&Value) -> Option<String>;

// --- Regras de extração (em ordem de prioridade) ---

fn chat_id_from(body: &Value) -> Option<String> {
    body.get("from").and_then(Value::as_str).map(strip_wa_suffix)
}

fn chat_id_remote_jid(body: &Value) -> Option<String> {
    body.get("remoteJid").and_then(Value::as_str).map(strip_wa_suffix)
}

const CHAT_ID_RULES: &[Rule] = &[chat_id_from, chat_id_remote_jid];

fn content_body(body: &Value) -> Option<String> {
    body.get("body").and_then(Value::as_str).map(str::to_string)
}

fn content_text(body: &Value) -> Option<String> {
    body.get("text").and_then(Value::as_str).map(str::to_string)
}

fn content_conversation(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(|m| m.get("conversation"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

const CONTENT_RULES: &[Rule] = &[content_body, content_text, content_conversation];

fn message_id_key(body: &Value) -> Option<String> {
    body.get("key")
        .and_then(|k| k.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn message_id_plain(body: &Value) -> Option<String> {
    body.get("id").and_then(Value::as_str).map(str::to_string)
}

const MESSAGE_ID_RULES: &[Rule] = &[message_id_key, message_id_plain];

fn push_name_push(body: &Value) -> Option<String> {
    body.get("pushName").and_then(Value::as_str).map(str::to_string)
}

fn push_name_notify(body: &Value) -> Option<String> {
    body.get("notifyName").and_then(Value::as_str).map(str::to_string)
}

const PUSH_NAME_RULES: &[Rule] = &[push_name_push, push_name_notify];

fn status_direct(body: &Value) -> Option<String> {
    body.get("status").and_then(Value::as_str).map(str::to_string)
}

fn status_nested(body: &Value) -> Option<String> {
    body.get("update")
        .and_then(|u| u.get("status"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

const STATUS_RULES: &[Rule] = &[status_direct, status_nested];

fn state_connection(body: &Value) -> Option<String> {
    body.get("connection").and_then(Value::as_str).map(str::to_string)
}

const STATE_RULES: &[Rule] = &[state_connection, status_direct];

fn strip_wa_suffix(raw: &str) -> String {
    raw.strip_suffix(WA_SUFFIX).unwrap_or(raw).to_string()
}

/// Primeira regra que devolve valor não-vazio ganha.
fn first_match(body: &Value, rules: &[Rule]) -> Option<String> {
    rules
        .iter()
        .find_map(|rule| rule(body).filter(|v| !v.trim().is_empty()))
}

// O corpo útil pode vir embrulhado em `data`, em `message` ou direto na raiz
fn event_body<'a>(payload: &'a Value, wrappers: &[&str]) -> &'a Value {
    wrappers
        .iter()
        .find_map(|key| payload.get(*key).filter(|v| v.is_object()))
        .unwrap_or(payload)
}

fn event_type(payload: &Value) -> Option<String> {
    payload
        .get("event")
        .or_else(|| payload.get("type"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn timestamp(body: &Value) -> Option<i64> {
    let raw = body.get("messageTimestamp")?;
    raw.as_i64()
        .or_else(|| raw.as_str().and_then(|s| s.parse().ok()))
}

/// Converte o payload opaco do webhook em um evento canônico.
pub fn normalize(payload: &Value) -> Result<CanonicalEvent, RejectedEvent> {
    match event_type(payload).as_deref() {
        Some("messages.upsert") | Some("message") => normalize_inbound(payload),
        Some("messages.update") | Some("message.status") => normalize_status(payload),
        Some("connection.update") => normalize_connection(payload),
        other => Ok(CanonicalEvent::Unrecognized {
            event_type: other.map(str::to_string),
        }),
    }
}

fn normalize_inbound(payload: &Value) -> Result<CanonicalEvent, RejectedEvent> {
    let body = event_body(payload, &["data", "message"]);

    let external_chat_id = first_match(body, CHAT_ID_RULES)
        .ok_or_else(|| RejectedEvent::new("mensagem sem identificador de chat"))?;
    let content = first_match(body, CONTENT_RULES)
        .ok_or_else(|| RejectedEvent::new("mensagem sem conteúdo"))?;
    let external_message_id = first_match(body, MESSAGE_ID_RULES)
        .ok_or_else(|| RejectedEvent::new("mensagem sem id externo"))?;

    Ok(CanonicalEvent::InboundMessage(InboundMessageEvent {
        external_chat_id,
        content,
        external_message_id,
        push_name: first_match(body, PUSH_NAME_RULES),
        timestamp: timestamp(body),
    }))
}

fn normalize_status(payload: &Value) -> Result<CanonicalEvent, RejectedEvent> {
    let body = event_body(payload, &["data"]);

    let external_message_id = first_match(body, MESSAGE_ID_RULES)
        .ok_or_else(|| RejectedEvent::new("atualização de status sem id de mensagem"))?;
    let raw_status = first_match(body, STATUS_RULES)
        .ok_or_else(|| RejectedEvent::new("atualização de status sem valor de status"))?;

    Ok(CanonicalEvent::StatusUpdate(StatusUpdateEvent {
        external_message_id,
        raw_status,
    }))
}

fn normalize_connection(payload: &Value) -> Result<CanonicalEvent, RejectedEvent> {
    let body = event_body(payload, &["data"]);

    let raw_state = first_match(body, STATE_RULES)
        .ok_or_else(|| RejectedEvent::new("evento de conexão sem estado"))?;

    Ok(CanonicalEvent::ConnectionStateChanged { raw_state })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inbound_with_modern_shape() {
        let payload = json!({
            "event": "messages.upsert",
            "data": {
                "from": "5511999990000@s.whatsapp.net",
                "body": "Oi",
                "key": { "id": "wamid.A" },
                "pushName": "Maria",
                "messageTimestamp": 1722470400
            }
        });

        let event = normalize(&payload).unwrap();
        assert_eq!(
            event,
            CanonicalEvent::InboundMessage(InboundMessageEvent {
                external_chat_id: "5511999990000".into(),
                content: "Oi".into(),
                external_message_id: "wamid.A".into(),
                push_name: Some("Maria".into()),
                timestamp: Some(1722470400),
            })
        );
    }

    #[test]
    fn inbound_with_legacy_shape() {
        // Formato antigo: tipo em `type`, corpo em `message`, remetente em
        // `remoteJid`, conteúdo aninhado em `message.conversation`.
        let payload = json!({
            "type": "message",
            "message": {
                "remoteJid": "5511888880000@s.whatsapp.net",
                "id": "wamid.B",
                "notifyName": "João",
                "message": { "conversation": "Quero um orçamento" }
            }
        });

        let event = normalize(&payload).unwrap();
        let CanonicalEvent::InboundMessage(inbound) = event else {
            panic!("esperava InboundMessage");
        };
        assert_eq!(inbound.external_chat_id, "5511888880000");
        assert_eq!(inbound.content, "Quero um orçamento");
        assert_eq!(inbound.external_message_id, "wamid.B");
        assert_eq!(inbound.push_name.as_deref(), Some("João"));
    }

    #[test]
    fn inbound_prefers_from_over_remote_jid() {
        let payload = json!({
            "event": "messages.upsert",
            "data": {
                "from": "111@s.whatsapp.net",
                "remoteJid": "222@s.whatsapp.net",
                "body": "olá",
                "id": "wamid.C"
            }
        });

        let CanonicalEvent::InboundMessage(inbound) = normalize(&payload).unwrap() else {
            panic!("esperava InboundMessage");
        };
        assert_eq!(inbound.external_chat_id, "111");
    }

    #[test]
    fn inbound_without_chat_id_is_rejected() {
        let payload = json!({
            "event": "messages.upsert",
            "data": { "body": "Oi", "id": "wamid.D" }
        });

        let rejected = normalize(&payload).unwrap_err();
        assert_eq!(rejected.reason, "mensagem sem identificador de chat");
    }

    #[test]
    fn inbound_without_content_is_rejected() {
        let payload = json!({
            "event": "messages.upsert",
            "data": { "from": "555@s.whatsapp.net", "id": "wamid.E" }
        });

        let rejected = normalize(&payload).unwrap_err();
        assert_eq!(rejected.reason, "mensagem sem conteúdo");
    }

    #[test]
    fn inbound_with_empty_content_is_rejected() {
        let payload = json!({
            "event": "messages.upsert",
            "data": { "from": "555@s.whatsapp.net", "body": "", "id": "wamid.F" }
        });

        assert!(normalize(&payload).is_err());
    }

    #[test]
    fn inbound_without_message_id_is_rejected() {
        let payload = json!({
            "event": "messages.upsert",
            "data": { "from": "555@s.whatsapp.net", "body": "Oi" }
        });

        let rejected = normalize(&payload).unwrap_err();
        assert_eq!(rejected.reason, "mensagem sem id externo");
    }

    #[test]
    fn status_update_with_nested_key() {
        let payload = json!({
            "event": "messages.update",
            "data": {
                "key": { "id": "wamid.A" },
                "update": { "status": "read" }
            }
        });

        let event = normalize(&payload).unwrap();
        assert_eq!(
            event,
            CanonicalEvent::StatusUpdate(StatusUpdateEvent {
                external_message_id: "wamid.A".into(),
                raw_status: "read".into(),
            })
        );
    }

    #[test]
    fn status_update_flat_shape() {
        let payload = json!({
            "event": "message.status",
            "id": "wamid.B",
            "status": "delivered"
        });

        let event = normalize(&payload).unwrap();
        assert_eq!(
            event,
            CanonicalEvent::StatusUpdate(StatusUpdateEvent {
                external_message_id: "wamid.B".into(),
                raw_status: "delivered".into(),
            })
        );
    }

    #[test]
    fn status_update_without_id_is_rejected() {
        let payload = json!({
            "event": "messages.update",
            "data": { "status": "read" }
        });

        assert!(normalize(&payload).is_err());
    }

    #[test]
    fn connection_update_maps_raw_state() {
        let payload = json!({
            "event": "connection.update",
            "data": { "connection": "open" }
        });

        let event = normalize(&payload).unwrap();
        assert_eq!(event, CanonicalEvent::ConnectionStateChanged { raw_state: "open".into() });
    }

    #[test]
    fn connection_update_falls_back_to_status_field() {
        let payload = json!({
            "event": "connection.update",
            "status": "connecting"
        });

        let event = normalize(&payload).unwrap();
        assert_eq!(
            event,
            CanonicalEvent::ConnectionStateChanged { raw_state: "connecting".into() }
        );
    }

    #[test]
    fn unknown_event_type_is_unrecognized() {
        let payload = json!({ "event": "presence.update", "data": {} });

        let event = normalize(&payload).unwrap();
        assert_eq!(
            event,
            CanonicalEvent::Unrecognized { event_type: Some("presence.update".into()) }
        );
    }

    #[test]
    fn payload_without_event_type_is_unrecognized() {
        let payload = json!({ "data": { "body": "Oi" } });

        let event = normalize(&payload).unwrap();
        assert_eq!(event, CanonicalEvent::Unrecognized { event_type: None });
    }
}
