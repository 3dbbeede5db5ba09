// src/handlers/realtime.rs

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{common::error::AppError, config::AppState, middleware::auth::decode_claims};

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    token: Option<String>,
}

// GET /ws?token=...
//
// O token vem por query porque browsers não mandam header Authorization
// no handshake de WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsAuthQuery>,
    State(app_state): State<AppState>,
) -> Result<Response, AppError> {
    let token = query.token.ok_or(AppError::InvalidToken)?;
    let claims = decode_claims(&token, &app_state.jwt_secret)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, app_state, claims.org, claims.sub)))
}

// Entra na "sala" da organização e encaminha os eventos do hub até o
// cliente fechar. O canal é só de saída.
async fn handle_socket(socket: WebSocket, app_state: AppState, org_id: Uuid, user_id: Uuid) {
    tracing::info!(%user_id, %org_id, "Socket conectado");

    let (mut sender, mut receiver) = socket.split();
    let mut events = app_state.realtime.subscribe(org_id);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                // Assinante atrasado perdeu eventos do buffer: segue em
                // frente, o cliente ressincroniza pela API REST.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%user_id, skipped, "Assinante realtime atrasado");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(_)) => break,
                // Ping/pong o axum responde sozinho; o resto ignoramos
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!(%user_id, "Socket desconectado");
}
