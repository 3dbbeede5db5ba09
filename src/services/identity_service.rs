// src/services/identity_service.rs

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{ContactRepository, ConversationRepository, FunnelRepository},
    models::{contact::Contact, conversation::Conversation},
};

/// Resolvedor de identidade: de um wa_id cru para (Contato, Conversa),
/// criando o que faltar.
///
/// A resolução nunca faz check-then-create: a unicidade vem dos índices
/// do banco (insert-or-get), porque dois webhooks do mesmo contato novo
/// chegam juntos com frequência.
#[derive(Clone)]
pub struct IdentityService {
    contacts: ContactRepository,
    conversations: ConversationRepository,
    funnels: FunnelRepository,
}

impl IdentityService {
    pub fn new(
        contacts: ContactRepository,
        conversations: ConversationRepository,
        funnels: FunnelRepository,
    ) -> Self {
        Self { contacts, conversations, funnels }
    }

    pub async fn resolve(
        &self,
        organization_id: Uuid,
        wa_id: &str,
        push_name: Option<&str>,
    ) -> Result<(Contact, Conversation), AppError> {
        let contact = self.resolve_contact(organization_id, wa_id, push_name).await?;
        let conversation = self.resolve_open_conversation(organization_id, &contact).await?;

        Ok((contact, conversation))
    }

    async fn resolve_contact(
        &self,
        organization_id: Uuid,
        wa_id: &str,
        push_name: Option<&str>,
    ) -> Result<Contact, AppError> {
        // Caminho comum: contato já existe, só atualiza push_name/interação.
        if let Some(existing) = self.contacts.find_by_wa_id(organization_id, wa_id).await? {
            return self.contacts.apply_push_name_backfill(existing.id, push_name).await;
        }

        // Contato novo: atribui o funil padrão da organização (best-effort;
        // organização sem funil padrão não é erro).
        let funnel = self.funnels.find_default_entry(organization_id).await?;
        if funnel.is_none() {
            tracing::debug!(%organization_id, "Organização sem funil padrão; contato criado sem funil");
        }

        self.contacts
            .insert_or_get(organization_id, wa_id, push_name, funnel.as_ref())
            .await
    }

    async fn resolve_open_conversation(
        &self,
        organization_id: Uuid,
        contact: &Contact,
    ) -> Result<Conversation, AppError> {
        if let Some(open) = self.conversations.find_open_for_contact(contact.id).await? {
            return Ok(open);
        }

        match self.conversations.insert_open(organization_id, contact.id).await? {
            Some(created) => Ok(created),
            // Perdeu a corrida: outra requisição abriu a conversa primeiro.
            None => self
                .conversations
                .find_open_for_contact(contact.id)
                .await?
                .ok_or_else(|| {
                    AppError::InternalServerError(anyhow::anyhow!(
                        "conversa aberta sumiu entre o conflito e a releitura"
                    ))
                }),
        }
    }
}
