// src/services/connection_service.rs

//! Máquina de estados da conexão WhatsApp, uma por organização.
//!
//! DISCONNECTED -> CONNECTING -> CONNECTED, com retorno a DISCONNECTED
//! por desconexão explícita, falha de pareamento ou expiração da janela.
//! O provisionamento no provedor é single-flight por organização.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::ConnectionRepository,
    models::{
        connection::{ConnectionStatus, ConnectionStatusView, PairingView, WhatsAppConnection},
        realtime::RealtimeEvent,
    },
    services::{
        realtime::RealtimeHub,
        uazapi::{ProviderStatus, WhatsAppProvider},
    },
};

/// Janela máxima de pareamento antes de abortar o CONNECTING.
const PAIRING_WINDOW: Duration = Duration::from_secs(5 * 60);
/// Cadência do poll de reconciliação durante o pareamento.
const PAIRING_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Quantos reports "disconnected" seguidos derrubam um CONNECTED.
/// Um report isolado pode ser só um poll com dado velho.
const DISCONNECT_STRIKES: u32 = 2;

/// Converte o estado cru reportado pelo provedor para o nosso enum.
pub fn map_provider_state(raw: &str) -> ConnectionStatus {
    match raw {
        "connected" => ConnectionStatus::Connected,
        "connecting" => ConnectionStatus::Connecting,
        _ => ConnectionStatus::Disconnected,
    }
}

/// Converte o estado do webhook connection.update (vocabulário diferente
/// do poll: open/close/connecting).
pub fn map_webhook_state(raw: &str) -> Option<ConnectionStatus> {
    match raw {
        "open" => Some(ConnectionStatus::Connected),
        "close" => Some(ConnectionStatus::Disconnected),
        "connecting" => Some(ConnectionStatus::Connecting),
        _ => None,
    }
}

/// Locks nomeados por organização: pedidos de provisionamento simultâneos
/// esperam o que está em voo em vez de provisionar duas vezes.
#[derive(Clone, Default)]
pub struct OrgLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl OrgLocks {
    pub async fn acquire(&self, organization_id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(organization_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

enum PollVerdict {
    KeepPolling,
    Done,
}

#[derive(Clone)]
pub struct ConnectionService {
    repo: ConnectionRepository,
    provider: Arc<dyn WhatsAppProvider>,
    realtime: RealtimeHub,
    provision_locks: OrgLocks,
    pairing_watchers: Arc<DashMap<Uuid, CancellationToken>>,
    disconnect_strikes: Arc<DashMap<Uuid, u32>>,
}

impl ConnectionService {
    pub fn new(
        repo: ConnectionRepository,
        provider: Arc<dyn WhatsAppProvider>,
        realtime: RealtimeHub,
    ) -> Self {
        Self {
            repo,
            provider,
            realtime,
            provision_locks: OrgLocks::default(),
            pairing_watchers: Arc::new(DashMap::new()),
            disconnect_strikes: Arc::new(DashMap::new()),
        }
    }

    // O webhook chega endereçado pelo id da conexão
    pub async fn find_by_connection_id(
        &self,
        connection_id: Uuid,
    ) -> Result<Option<WhatsAppConnection>, AppError> {
        self.repo.find_by_id(connection_id).await
    }

    /// Status da conexão, reconciliando oportunisticamente com o provedor.
    ///
    /// Falha de um único poll é logada e ignorada: respondemos com o
    /// estado local e tentamos de novo na próxima consulta.
    pub async fn status(&self, organization_id: Uuid) -> Result<ConnectionStatusView, AppError> {
        let Some(connection) = self.repo.find_by_org(organization_id).await? else {
            return Ok(ConnectionStatusView::absent());
        };

        if let Some(token) = connection.usable_token() {
            match self.provider.instance_status(token).await {
                Ok(live) => return self.reconcile(&connection, &live).await,
                Err(err) => {
                    tracing::warn!(
                        %organization_id,
                        error = %err,
                        "Poll de status falhou; mantendo estado local"
                    );
                }
            }
        }

        Ok(ConnectionStatusView::from_local(&connection))
    }

    /// Configuração manual de token (setup inicial): o token só entra no
    /// banco depois que o provedor o aceitou.
    pub async fn setup(
        &self,
        organization_id: Uuid,
        token: &str,
        instance_name: Option<&str>,
    ) -> Result<ConnectionStatusView, AppError> {
        let live = self.provider.instance_status(token).await?;

        // No setup não existe meio-termo: ou a instância já está conectada,
        // ou ela fica DISCONNECTED até alguém chamar connect.
        let status = if live.state == "connected" {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        };

        let connection = self
            .repo
            .upsert_provisioned(
                organization_id,
                live.instance_name.as_deref().or(instance_name),
                token,
                status,
                live.phone_number.as_deref(),
                live.display_name.as_deref(),
            )
            .await?;

        Ok(ConnectionStatusView::from_local(&connection))
    }

    /// Pede pareamento ao provedor (QR sem telefone, código com telefone)
    /// e deixa a organização em CONNECTING com um watcher de reconciliação.
    pub async fn connect(
        &self,
        organization_id: Uuid,
        phone: Option<&str>,
    ) -> Result<PairingView, AppError> {
        let connection = self.ensure_provisioned(organization_id).await?;
        let token = connection
            .usable_token()
            .ok_or(AppError::ConnectionNotConfigured)?;

        // Só os dígitos, igual o app manda
        let digits = phone.map(|p| p.chars().filter(char::is_ascii_digit).collect::<String>());

        let live = self.provider.connect(token, digits.as_deref()).await?;

        self.repo
            .set_status(organization_id, ConnectionStatus::Connecting)
            .await?;
        self.publish_status(organization_id, ConnectionStatus::Connecting, None, None);

        self.spawn_pairing_watcher(organization_id);

        Ok(PairingView {
            status: ConnectionStatus::Connecting,
            qrcode: live.qrcode,
            pairing_code: live.pairing_code,
        })
    }

    /// Desconexão explícita: a intenção do usuário vale mais que o
    /// provedor. O estado local SEMPRE termina DISCONNECTED, mesmo com o
    /// provedor fora do ar.
    pub async fn disconnect(&self, organization_id: Uuid) -> Result<(), AppError> {
        let Some(connection) = self.repo.find_by_org(organization_id).await? else {
            return Err(AppError::ConnectionNotFound);
        };

        // Para o watcher de pareamento antes de mexer no estado
        if let Some((_, watcher)) = self.pairing_watchers.remove(&organization_id) {
            watcher.cancel();
        }

        if let Some(token) = connection.usable_token() {
            if let Err(err) = self.provider.disconnect(token).await {
                tracing::warn!(
                    %organization_id,
                    error = %err,
                    "Provedor não confirmou o disconnect; estado local aplicado mesmo assim"
                );
            }
        }

        self.repo.mark_disconnected(organization_id).await?;
        self.disconnect_strikes.remove(&organization_id);
        self.publish_status(organization_id, ConnectionStatus::Disconnected, None, None);

        Ok(())
    }

    /// Transição vinda do webhook connection.update do provedor.
    pub async fn apply_webhook_state(
        &self,
        connection: &WhatsAppConnection,
        raw_state: &str,
    ) -> Result<(), AppError> {
        let Some(status) = map_webhook_state(raw_state) else {
            metrics::counter!("watson_connection_state_unmapped_total").increment(1);
            tracing::warn!(
                connection_id = %connection.id,
                raw_state,
                "Estado de conexão fora do catálogo; ignorado"
            );
            return Ok(());
        };

        if let Some(updated) = self.repo.update_status_by_id(connection.id, status).await? {
            self.disconnect_strikes.remove(&updated.organization_id);
            self.publish_status(
                updated.organization_id,
                status,
                updated.phone_number.clone(),
                updated.display_name.clone(),
            );
        }

        Ok(())
    }

    /// Provisionamento single-flight: o lock da organização colapsa
    /// pedidos simultâneos em UMA chamada de init no provedor.
    async fn ensure_provisioned(
        &self,
        organization_id: Uuid,
    ) -> Result<WhatsAppConnection, AppError> {
        let _guard = self.provision_locks.acquire(organization_id).await;

        // Releitura dentro do lock: quem esperou herda o resultado de quem
        // provisionou primeiro.
        if let Some(connection) = self.repo.find_by_org(organization_id).await? {
            if let Some(token) = connection.usable_token() {
                match self.provider.instance_status(token).await {
                    Ok(_) => return Ok(connection),
                    Err(AppError::InvalidProviderToken) => {
                        tracing::warn!(
                            %organization_id,
                            "Token Uazapi existente foi recusado; provisionando instância nova"
                        );
                    }
                    // Provedor fora do ar: não provisiona às cegas por cima
                    // de um token possivelmente válido.
                    Err(err) => return Err(err),
                }
            }
        }

        let name = self
            .repo
            .find_org_name(organization_id)
            .await?
            .unwrap_or_else(|| organization_id.to_string());

        let instance = self.provider.init_instance(&name).await?;

        let connection = self
            .repo
            .upsert_provisioned(
                organization_id,
                instance.instance_name.as_deref(),
                &instance.token,
                ConnectionStatus::Disconnected,
                None,
                None,
            )
            .await?;

        tracing::info!(%organization_id, "Instância Uazapi provisionada");
        Ok(connection)
    }

    /// Reconcilia o registro local com o que o provedor reportou.
    async fn reconcile(
        &self,
        connection: &WhatsAppConnection,
        live: &ProviderStatus,
    ) -> Result<ConnectionStatusView, AppError> {
        let reported = map_provider_state(&live.state);

        let updated = match (connection.status, reported) {
            // Derrubar um CONNECTED exige corroboração: um report isolado
            // de "disconnected" pode ser dado velho do provedor.
            (ConnectionStatus::Connected, ConnectionStatus::Disconnected) => {
                let strikes = {
                    let mut entry = self
                        .disconnect_strikes
                        .entry(connection.organization_id)
                        .or_insert(0);
                    *entry += 1;
                    *entry
                };

                if strikes >= DISCONNECT_STRIKES {
                    self.disconnect_strikes.remove(&connection.organization_id);
                    let updated = self.repo.mark_disconnected(connection.organization_id).await?;
                    self.publish_status(
                        connection.organization_id,
                        ConnectionStatus::Disconnected,
                        None,
                        None,
                    );
                    updated
                } else {
                    tracing::warn!(
                        organization_id = %connection.organization_id,
                        strikes,
                        "Provedor reportou disconnected; aguardando corroboração"
                    );
                    None
                }
            }
            (local, ConnectionStatus::Connected) => {
                self.disconnect_strikes.remove(&connection.organization_id);
                let updated = self
                    .repo
                    .mark_connected(
                        connection.organization_id,
                        live.phone_number.as_deref(),
                        live.display_name.as_deref(),
                        live.profile_pic_url.as_deref(),
                    )
                    .await?;
                if local != ConnectionStatus::Connected {
                    self.publish_status(
                        connection.organization_id,
                        ConnectionStatus::Connected,
                        live.phone_number.clone(),
                        live.display_name.clone(),
                    );
                }
                updated
            }
            (local, reported) => {
                self.disconnect_strikes.remove(&connection.organization_id);
                if local != reported {
                    let updated = self.repo.set_status(connection.organization_id, reported).await?;
                    self.publish_status(connection.organization_id, reported, None, None);
                    updated
                } else {
                    None
                }
            }
        };

        let base = updated.unwrap_or_else(|| connection.clone());
        let mut view = ConnectionStatusView::from_local(&base);
        // Artefatos de pareamento são transientes: passam direto do
        // provedor para a resposta, sem tocar no banco.
        view.qrcode = live.qrcode.clone();
        view.pairing_code = live.pairing_code.clone();
        view.phone_number = live.phone_number.clone().or(view.phone_number);
        view.display_name = live.display_name.clone().or(view.display_name);

        Ok(view)
    }

    /// Poll de reconciliação enquanto a organização está CONNECTING.
    ///
    /// Para quando: o pareamento resolve (qualquer direção), alguém
    /// desconecta explicitamente (cancel) ou a janela de 5 minutos expira.
    /// Nenhum watcher sobrevive à tentativa de conexão que o criou.
    fn spawn_pairing_watcher(&self, organization_id: Uuid) {
        let cancel = CancellationToken::new();
        if let Some(previous) = self
            .pairing_watchers
            .insert(organization_id, cancel.clone())
        {
            previous.cancel();
        }

        let service = self.clone();
        tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + PAIRING_WINDOW;
            let mut ticker = tokio::time::interval(PAIRING_POLL_INTERVAL);
            // O primeiro tick do interval dispara imediatamente
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep_until(deadline) => {
                        service.abort_expired_pairing(organization_id).await;
                        break;
                    }
                    _ = ticker.tick() => {
                        match service.poll_pairing_once(organization_id).await {
                            Ok(PollVerdict::KeepPolling) => {}
                            Ok(PollVerdict::Done) => break,
                            Err(err) => {
                                // Erro de poll isolado não muda estado
                                tracing::warn!(
                                    %organization_id,
                                    error = %err,
                                    "Poll de pareamento falhou; tentando de novo"
                                );
                            }
                        }
                    }
                }
            }
        });
    }

    async fn poll_pairing_once(&self, organization_id: Uuid) -> Result<PollVerdict, AppError> {
        let Some(connection) = self.repo.find_by_org(organization_id).await? else {
            return Ok(PollVerdict::Done);
        };
        // Alguém já resolveu (webhook, disconnect explícito...)
        if connection.status != ConnectionStatus::Connecting {
            return Ok(PollVerdict::Done);
        }
        let Some(token) = connection.usable_token() else {
            return Ok(PollVerdict::Done);
        };

        let live = self.provider.instance_status(token).await?;

        match map_provider_state(&live.state) {
            ConnectionStatus::Connected => {
                self.repo
                    .mark_connected(
                        organization_id,
                        live.phone_number.as_deref(),
                        live.display_name.as_deref(),
                        live.profile_pic_url.as_deref(),
                    )
                    .await?;
                self.publish_status(
                    organization_id,
                    ConnectionStatus::Connected,
                    live.phone_number,
                    live.display_name,
                );
                tracing::info!(%organization_id, "Pareamento concluído");
                Ok(PollVerdict::Done)
            }
            ConnectionStatus::Connecting => Ok(PollVerdict::KeepPolling),
            ConnectionStatus::Disconnected => {
                self.repo
                    .set_status(organization_id, ConnectionStatus::Disconnected)
                    .await?;
                self.publish_status(organization_id, ConnectionStatus::Disconnected, None, None);
                tracing::info!(%organization_id, "Pareamento encerrado pelo provedor");
                Ok(PollVerdict::Done)
            }
        }
    }

    async fn abort_expired_pairing(&self, organization_id: Uuid) {
        // Só aborta se ainda estiver CONNECTING: o estado pode ter virado
        // CONNECTED por webhook um instante antes do deadline.
        match self.repo.find_by_org(organization_id).await {
            Ok(Some(connection)) if connection.status == ConnectionStatus::Connecting => {
                tracing::info!(%organization_id, "Janela de pareamento expirou");
                if let Err(err) = self
                    .repo
                    .set_status(organization_id, ConnectionStatus::Disconnected)
                    .await
                {
                    tracing::error!(%organization_id, error = %err, "Falha ao abortar pareamento expirado");
                    return;
                }
                self.publish_status(organization_id, ConnectionStatus::Disconnected, None, None);
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(%organization_id, error = %err, "Falha ao checar pareamento expirado");
            }
        }
    }

    fn publish_status(
        &self,
        organization_id: Uuid,
        status: ConnectionStatus,
        phone_number: Option<String>,
        display_name: Option<String>,
    ) {
        self.realtime.publish(
            organization_id,
            RealtimeEvent::ConnectionUpdate { status, phone_number, display_name },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    #[test]
    fn provider_state_mapping() {
        assert_eq!(map_provider_state("connected"), ConnectionStatus::Connected);
        assert_eq!(map_provider_state("connecting"), ConnectionStatus::Connecting);
        assert_eq!(map_provider_state("disconnected"), ConnectionStatus::Disconnected);
        // Qualquer coisa desconhecida cai em DISCONNECTED
        assert_eq!(map_provider_state("banido"), ConnectionStatus::Disconnected);
    }

    #[test]
    fn webhook_state_mapping() {
        assert_eq!(map_webhook_state("open"), Some(ConnectionStatus::Connected));
        assert_eq!(map_webhook_state("close"), Some(ConnectionStatus::Disconnected));
        assert_eq!(map_webhook_state("connecting"), Some(ConnectionStatus::Connecting));
        assert_eq!(map_webhook_state("qualquer"), None);
    }

    // Simula o padrão do ensure_provisioned: lock + releitura antes de
    // provisionar. Dois pedidos simultâneos devem render UMA chamada.
    #[tokio::test]
    async fn org_lock_collapses_concurrent_provisioning() {
        let locks = OrgLocks::default();
        let org = Uuid::new_v4();
        let init_calls = Arc::new(AtomicUsize::new(0));
        let token: Arc<RwLock<Option<String>>> = Arc::new(RwLock::new(None));

        let provision = |locks: OrgLocks,
                         init_calls: Arc<AtomicUsize>,
                         token: Arc<RwLock<Option<String>>>| async move {
            let _guard = locks.acquire(org).await;
            if token.read().await.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            init_calls.fetch_add(1, Ordering::SeqCst);
            *token.write().await = Some("tok-123".to_string());
        };

        let a = tokio::spawn(provision(locks.clone(), init_calls.clone(), token.clone()));
        let b = tokio::spawn(provision(locks.clone(), init_calls.clone(), token.clone()));
        let (ra, rb) = tokio::join!(a, b);
        ra.unwrap();
        rb.unwrap();

        assert_eq!(init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(token.read().await.as_deref(), Some("tok-123"));
    }

    // Locks de organizações diferentes não se bloqueiam
    #[tokio::test]
    async fn org_locks_are_independent_per_organization() {
        let locks = OrgLocks::default();
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();

        let _guard_a = locks.acquire(org_a).await;
        // Se o lock fosse global, isto travaria para sempre
        let guard_b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(org_b)).await;
        assert!(guard_b.is_ok());
    }
}
