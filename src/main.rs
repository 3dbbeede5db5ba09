//src/main.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// Declaração dos nossos módulos
mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

// Importações principais
use crate::config::AppState;
use crate::middleware::auth::auth_guard;

#[tokio::main]
async fn main() {
    // Inicializa o logger
    tracing_subscriber::fmt().with_target(false).compact().init();

    // .expect() é bom aqui: se a configuração falhar, a aplicação não deve iniciar.
    let app_state = AppState::new()
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Roda as migrações do SQLx na inicialização
    sqlx::migrate!()
        .run(&app_state.db_pool)
        .await
        .expect("Falha ao rodar as migrações do banco de dados.");

    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    // Recorder de métricas (os contadores do pipeline aparecem em /metrics)
    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .expect("Falha ao instalar o recorder de métricas.");
    let metrics_handle = prometheus.clone();

    // Webhook do provedor (público: o provedor não manda JWT)
    let webhook_routes = Router::new()
        .route("/uazapi/{connection_id}", post(handlers::webhooks::uazapi_webhook));

    // Gestão da conexão WhatsApp (protegida)
    let whatsapp_routes = Router::new()
        .route("/status", get(handlers::whatsapp::get_status))
        .route("/connect/qrcode", post(handlers::whatsapp::connect_qrcode))
        .route("/connect/code", post(handlers::whatsapp::connect_code))
        .route("/disconnect", post(handlers::whatsapp::disconnect))
        .route("/setup", post(handlers::whatsapp::setup))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Fronteira com a camada CRUD: envio de mensagens
    let conversation_routes = Router::new()
        .route("/{id}/messages", post(handlers::conversations::send_message))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Combina tudo no router principal
    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/metrics", get(move || async move { metrics_handle.render() }))
        .route("/ws", get(handlers::realtime::ws_handler))
        .nest("/api/webhooks", webhook_routes)
        .nest("/api/whatsapp", whatsapp_routes)
        .nest("/api/conversations", conversation_routes)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", docs::ApiDoc::openapi()))
        .with_state(app_state);

    // Inicia o servidor
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Falha ao iniciar o listener TCP");
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .await
        .expect("Erro no servidor Axum");
}
