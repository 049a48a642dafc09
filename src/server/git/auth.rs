use axum::http::{HeaderMap, header};

use crate::auth::{TokenError, extract_basic_auth_token};
use crate::server::AppState;
use crate::types::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitAuthError {
    AuthRequired,
    InvalidCredentials,
    TokenExpired,
    SystemTokenNotAllowed,
    PathRejected,
    AppNotFound,
    InternalError,
}

impl GitAuthError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::AuthRequired | Self::InvalidCredentials | Self::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::SystemTokenNotAllowed | Self::PathRejected => StatusCode::FORBIDDEN,
            Self::AppNotFound => StatusCode::BAD_REQUEST,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication required",
            Self::InvalidCredentials => "Invalid credentials",
            Self::TokenExpired => "Token expired",
            Self::SystemTokenNotAllowed => "System tokens cannot be used for git operations",
            Self::PathRejected => "Forbidden",
            Self::AppNotFound => "Application not found",
            Self::InternalError => "Internal server error",
        }
    }

    pub fn requires_auth_header(&self) -> bool {
        matches!(
            self,
            Self::AuthRequired | Self::InvalidCredentials | Self::TokenExpired
        )
    }
}

/// Basic-only gate for the git surface: the password field carries the JWT,
/// the username is ignored. System tokens decode fine but are scoped to
/// release transfer, never to git itself.
pub fn authenticate_git(headers: &HeaderMap, state: &AppState) -> Result<Principal, GitAuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(GitAuthError::AuthRequired)?;

    let token =
        extract_basic_auth_token(auth_header).ok_or(GitAuthError::InvalidCredentials)?;

    let principal = state.tokens.decode(&token).map_err(|e| match e {
        TokenError::Expired => GitAuthError::TokenExpired,
        TokenError::Malformed | TokenError::Other => GitAuthError::InvalidCredentials,
    })?;

    if principal.is_system() {
        return Err(GitAuthError::SystemTokenNotAllowed);
    }

    Ok(principal)
}
