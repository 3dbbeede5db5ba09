// src/services/realtime.rs

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::realtime::RealtimeEvent;

// Cada organização tem seu canal; assinante atrasado perde eventos do
// buffer e ressincroniza pela API (entrega best-effort, sem replay).
const CHANNEL_CAPACITY: usize = 256;

/// Publicador de eventos realtime com escopo de organização.
///
/// Entrega at-most-once por assinante; a ordem de publicação dentro de
/// uma organização é preservada pelo canal broadcast.
#[derive(Clone, Default)]
pub struct RealtimeHub {
    channels: Arc<DashMap<Uuid, broadcast::Sender<RealtimeEvent>>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entra na "sala" da organização.
    pub fn subscribe(&self, organization_id: Uuid) -> broadcast::Receiver<RealtimeEvent> {
        self.channels
            .entry(organization_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publica para quem estiver ouvindo agora. Sem assinante, o evento
    /// simplesmente se perde — quem reconectar busca o estado pela API.
    pub fn publish(&self, organization_id: Uuid, event: RealtimeEvent) {
        if let Some(sender) = self.channels.get(&organization_id) {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::connection::ConnectionStatus;
    use serde_json::json;

    fn sample_event() -> RealtimeEvent {
        RealtimeEvent::ConversationUpdate {
            conversation_id: Uuid::new_v4(),
            updates: json!({ "status": "WAITING_AGENT" }),
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let hub = RealtimeHub::new();
        let org = Uuid::new_v4();

        let mut rx = hub.subscribe(org);
        hub.publish(org, sample_event());

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, RealtimeEvent::ConversationUpdate { .. }));
    }

    #[tokio::test]
    async fn events_are_scoped_per_organization() {
        let hub = RealtimeHub::new();
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();

        let mut rx_a = hub.subscribe(org_a);
        let mut rx_b = hub.subscribe(org_b);

        hub.publish(org_a, sample_event());

        assert!(rx_a.recv().await.is_ok());
        // org_b não pode ver o evento de org_a
        assert!(matches!(rx_b.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let hub = RealtimeHub::new();
        hub.publish(Uuid::new_v4(), sample_event());
    }

    #[tokio::test]
    async fn publish_order_is_preserved_per_organization() {
        let hub = RealtimeHub::new();
        let org = Uuid::new_v4();
        let mut rx = hub.subscribe(org);

        for status in [ConnectionStatus::Connecting, ConnectionStatus::Connected] {
            hub.publish(
                org,
                RealtimeEvent::ConnectionUpdate {
                    status,
                    phone_number: None,
                    display_name: None,
                },
            );
        }

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            RealtimeEvent::ConnectionUpdate { status: ConnectionStatus::Connecting, .. }
        ));
        assert!(matches!(
            second,
            RealtimeEvent::ConnectionUpdate { status: ConnectionStatus::Connected, .. }
        ));
    }
}
