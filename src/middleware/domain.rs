use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::auth::{AuthContext, DomainContext};
use crate::services::gate;
use crate::AppState;

/// Header naming the domain a request acts in.
pub const DOMAIN_HEADER: &str = "X-Domain";

/// Session check followed by the domain gate.
impl FromRequestParts<AppState> for DomainContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = AuthContext::from_request_parts(parts, state).await?;
        let domain = requested_domain(parts)?;

        Ok(gate::authorize_domain(state.policy.as_ref(), auth, domain).await?)
    }
}

fn requested_domain(parts: &Parts) -> Result<Uuid, ApiError> {
    let raw = parts
        .headers
        .get(DOMAIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("Missing {DOMAIN_HEADER} header")))?;

    Uuid::parse_str(raw).map_err(|_| ApiError::Validation(format!("Invalid {DOMAIN_HEADER} header")))
}
