use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::{ApiError, AuthError};
use crate::models::auth::{AuthContext, TokenKind};
use crate::AppState;

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Another extractor in the same request already did the work.
        if let Some(ctx) = parts.extensions.get::<AuthContext>() {
            return Ok(ctx.clone());
        }

        let token = bearer_token(parts).ok_or(AuthError::InvalidToken)?;

        let claims = state
            .sessions
            .parse_token(token, TokenKind::Access)
            .inspect_err(|e| tracing::debug!(error = %e, "access token rejected"))?;

        let user = state.sessions.validate_token(&claims, false).await?;

        // Sliding expiration: every authenticated request pushes the TTL back.
        let _ = state.sessions.renew(claims.id);

        let ctx = AuthContext { user, claims };
        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
