// src/docs.rs

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::OpenApi;

use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- WhatsApp ---
        handlers::whatsapp::get_status,
        handlers::whatsapp::connect_qrcode,
        handlers::whatsapp::connect_code,
        handlers::whatsapp::disconnect,
        handlers::whatsapp::setup,

        // --- Conversas ---
        handlers::conversations::send_message,

        // --- Webhooks ---
        handlers::webhooks::uazapi_webhook,
    ),
    components(
        schemas(
            // --- Domínio ---
            models::contact::Contact,
            models::conversation::Conversation,
            models::conversation::ConversationStatus,
            models::conversation::ConversationMode,
            models::message::Message,
            models::message::MessageDirection,
            models::message::MessageType,
            models::connection::WhatsAppConnection,
            models::connection::ConnectionStatus,
            models::connection::ConnectionStatusView,
            models::connection::PairingView,

            // --- Payloads ---
            handlers::whatsapp::ConnectWithCodePayload,
            handlers::whatsapp::SetupPayload,
            handlers::conversations::SendMessagePayload,
        )
    ),
    tags(
        (name = "WhatsApp", description = "Conexão da organização com o WhatsApp"),
        (name = "Conversas", description = "Registro de mensagens de saída"),
        (name = "Webhooks", description = "Ingestão de eventos do provedor")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}
