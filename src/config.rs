// src/config.rs

use std::{env, sync::Arc, time::Duration};

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::{
        ConnectionRepository, ContactRepository, ConversationRepository, FunnelRepository,
        MessageRepository,
    },
    services::{
        uazapi::UazapiClient, ConnectionService, IdentityService, LedgerService, RealtimeHub,
    },
};

const DEFAULT_UAZAPI_BASE_URL: &str = "https://hia-clientes.uazapi.com";

// O estado compartilhado que será acessível em toda a aplicação.
// Configuração é lida UMA vez aqui e injetada; nada lê env depois disso.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub jwt_secret: String,
    pub identity_service: IdentityService,
    pub ledger_service: LedgerService,
    pub connection_service: ConnectionService,
    pub realtime: RealtimeHub,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL deve ser definida");
        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET deve ser definido");
        let uazapi_base_url =
            env::var("UAZAPI_BASE_URL").unwrap_or_else(|_| DEFAULT_UAZAPI_BASE_URL.to_string());
        // Sem o admin token o provisionamento automático fica indisponível,
        // mas o setup manual de token continua funcionando.
        let uazapi_admin_token = env::var("UAZAPI_ADMIN_TOKEN").ok().filter(|t| !t.is_empty());

        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let contact_repo = ContactRepository::new(db_pool.clone());
        let conversation_repo = ConversationRepository::new(db_pool.clone());
        let message_repo = MessageRepository::new(db_pool.clone());
        let funnel_repo = FunnelRepository::new(db_pool.clone());
        let connection_repo = ConnectionRepository::new(db_pool.clone());

        let uazapi = UazapiClient::new(uazapi_base_url, uazapi_admin_token)?;
        let realtime = RealtimeHub::new();

        let identity_service = IdentityService::new(
            contact_repo.clone(),
            conversation_repo.clone(),
            funnel_repo,
        );
        let ledger_service =
            LedgerService::new(message_repo, conversation_repo, contact_repo);
        let connection_service =
            ConnectionService::new(connection_repo, Arc::new(uazapi), realtime.clone());

        Ok(Self {
            db_pool,
            jwt_secret,
            identity_service,
            ledger_service,
            connection_service,
            realtime,
        })
    }
}
