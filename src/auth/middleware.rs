use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::extract_basic_auth_token;
use super::token::TokenError;
use crate::server::AppState;
use crate::types::Principal;

/// Extractor that accepts any valid token, user or system.
pub struct RequireAuth(pub Principal);

/// Extractor that requires a user-kind token.
pub struct RequireUser(pub Principal);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    NotUser,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::NotUser => (
                StatusCode::FORBIDDEN,
                "User token required for this operation",
            ),
        };

        let body = json!({ "data": null, "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                "Bearer realm=\"slipway\"".parse().unwrap(),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let principal = extract_and_decode(parts, state)?;
        Ok(RequireAuth(principal))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let principal = extract_and_decode(parts, state)?;

        if principal.is_system() {
            return Err(AuthError::NotUser);
        }

        Ok(RequireUser(principal))
    }
}

fn extract_and_decode(parts: &mut Parts, state: &Arc<AppState>) -> Result<Principal, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let raw_token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => header
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .ok_or(AuthError::InvalidToken)?,
        Some(header) if header.starts_with("Basic ") => {
            extract_basic_auth_token(header).ok_or(AuthError::InvalidToken)?
        }
        Some(_) => return Err(AuthError::InvalidScheme),
        None => return Err(AuthError::MissingAuth),
    };

    state.tokens.decode(&raw_token).map_err(|e| match e {
        TokenError::Expired => AuthError::TokenExpired,
        TokenError::Malformed | TokenError::Other => AuthError::InvalidToken,
    })
}
