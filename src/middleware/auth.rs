// src/middleware/auth.rs

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::{
    common::error::AppError,
    config::AppState,
    models::auth::{Claims, CurrentUser},
};

// Decodifica e valida o JWT emitido pelo serviço de auth
pub fn decode_claims(token: &str, jwt_secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|_| AppError::InvalidToken)?;

    Ok(token_data.claims)
}

// O middleware em si
pub async fn auth_guard(
    State(app_state): State<AppState>,
    auth_header: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(auth) = auth_header.ok_or(AppError::InvalidToken)?;
    let claims = decode_claims(auth.token(), &app_state.jwt_secret)?;

    // Insere a identidade nos "extensions" da requisição
    request.extensions_mut().insert(CurrentUser {
        user_id: claims.sub,
        org_id: claims.org,
    });

    Ok(next.run(request).await)
}

// Extrator para obter a identidade autenticada diretamente nos handlers
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AppError::InvalidToken)
    }
}
