// src/handlers/whatsapp.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    common::error::AppError,
    config::AppState,
    models::auth::CurrentUser,
};

// GET /api/whatsapp/status
#[utoipa::path(
    get,
    path = "/api/whatsapp/status",
    tag = "WhatsApp",
    responses(
        (status = 200, description = "Status atual da conexão", body = crate::models::connection::ConnectionStatusView)
    ),
    security(("api_jwt" = []))
)]
pub async fn get_status(
    State(app_state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let view = app_state.connection_service.status(user.org_id).await?;

    Ok(Json(json!({ "success": true, "data": view })))
}

// POST /api/whatsapp/connect/qrcode
#[utoipa::path(
    post,
    path = "/api/whatsapp/connect/qrcode",
    tag = "WhatsApp",
    responses(
        (status = 200, description = "Pareamento iniciado em modo QR code", body = crate::models::connection::PairingView),
        (status = 502, description = "Provedor indisponível")
    ),
    security(("api_jwt" = []))
)]
pub async fn connect_qrcode(
    State(app_state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let pairing = app_state.connection_service.connect(user.org_id, None).await?;

    Ok(Json(json!({ "success": true, "data": pairing })))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConnectWithCodePayload {
    #[validate(length(min = 8, message = "Número de telefone obrigatório."))]
    #[schema(example = "+55 11 99999-0000")]
    pub phone: String,
}

// POST /api/whatsapp/connect/code
#[utoipa::path(
    post,
    path = "/api/whatsapp/connect/code",
    tag = "WhatsApp",
    request_body = ConnectWithCodePayload,
    responses(
        (status = 200, description = "Pareamento iniciado com código numérico", body = crate::models::connection::PairingView),
        (status = 400, description = "Telefone ausente ou inválido"),
        (status = 502, description = "Provedor indisponível")
    ),
    security(("api_jwt" = []))
)]
pub async fn connect_code(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<ConnectWithCodePayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let pairing = app_state
        .connection_service
        .connect(user.org_id, Some(&payload.phone))
        .await?;

    Ok(Json(json!({ "success": true, "data": pairing })))
}

// POST /api/whatsapp/disconnect
#[utoipa::path(
    post,
    path = "/api/whatsapp/disconnect",
    tag = "WhatsApp",
    responses(
        (status = 200, description = "Desconectado (estado local sempre aplicado)"),
        (status = 404, description = "Organização sem conexão")
    ),
    security(("api_jwt" = []))
)]
pub async fn disconnect(
    State(app_state): State<AppState>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(user_id = %user.user_id, organization_id = %user.org_id, "Desconexão solicitada");
    app_state.connection_service.disconnect(user.org_id).await?;

    Ok(Json(json!({ "success": true, "message": "Desconectado com sucesso" })))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetupPayload {
    #[validate(length(min = 1, message = "Token Uazapi obrigatório."))]
    pub token: String,
    pub instance_name: Option<String>,
}

// POST /api/whatsapp/setup — configuração manual de token
#[utoipa::path(
    post,
    path = "/api/whatsapp/setup",
    tag = "WhatsApp",
    request_body = SetupPayload,
    responses(
        (status = 200, description = "Token validado e conexão gravada", body = crate::models::connection::ConnectionStatusView),
        (status = 400, description = "Token inválido")
    ),
    security(("api_jwt" = []))
)]
pub async fn setup(
    State(app_state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<SetupPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let view = app_state
        .connection_service
        .setup(user.org_id, &payload.token, payload.instance_name.as_deref())
        .await?;

    Ok((StatusCode::OK, Json(json!({ "success": true, "data": view }))))
}
