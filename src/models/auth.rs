use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::DomainRef;
use super::user::User;

/// Claims embedded in both access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionClaims {
    /// Per-issuance token id, compared against the cached pair.
    pub uid: String,
    /// Principal numeric id.
    pub id: i64,
    /// Principal public id, also the policy subject.
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub domains: Vec<DomainRef>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Which half of a pair a token is; selects the secret and the cached uid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Value stored in the session cache under `token-<id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedTokens {
    #[serde(rename = "access")]
    pub access_uid: String,
    #[serde(rename = "refresh")]
    pub refresh_uid: String,
}

impl CachedTokens {
    pub fn uid_for(&self, is_refresh: bool) -> &str {
        if is_refresh {
            &self.refresh_uid
        } else {
            &self.access_uid
        }
    }
}

/// A freshly issued pair. `expires_at` is the access token's expiry in unix seconds.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Authenticated request context, produced by the session extractor.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub claims: SessionClaims,
}

/// Authenticated request context whose domain has passed the domain gate.
/// Only `services::gate::authorize_domain` constructs it.
#[derive(Debug, Clone)]
pub struct DomainContext {
    pub auth: AuthContext,
    pub domain: Uuid,
}

impl DomainContext {
    pub(crate) fn new(auth: AuthContext, domain: Uuid) -> Self {
        Self { auth, domain }
    }

    pub fn user(&self) -> &User {
        &self.auth.user
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct SocialCallbackQuery {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub exp: i64,
}

impl From<TokenPair> for LoginResponse {
    fn from(p: TokenPair) -> Self {
        Self {
            access_token: p.access_token,
            refresh_token: p.refresh_token,
            exp: p.expires_at,
        }
    }
}
