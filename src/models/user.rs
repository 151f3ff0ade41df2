use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::domain::DomainRef;

/// A principal. `password_hash` is empty for users that only ever signed in
/// through an external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct User {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub avatar: Option<String>,
    pub provider: Option<String>,
    pub provider_id: Option<String>,
    pub is_verified: bool,
    /// Active domain memberships; filled in by the credential store.
    #[sqlx(skip)]
    #[serde(default)]
    pub domains: Vec<DomainRef>,
}

impl User {
    pub fn has_password(&self) -> bool {
        !self.password_hash.is_empty()
    }
}

/// Fields needed to create a user row.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: Option<String>,
    pub provider: Option<String>,
    pub provider_id: Option<String>,
    pub is_verified: bool,
}

/// Public view of a user, safe to send to clients.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub uuid: Uuid,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub provider: Option<String>,
    pub is_verified: bool,
    pub domains: Vec<DomainRef>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            uuid: u.uuid,
            name: u.name,
            email: u.email,
            avatar: u.avatar,
            provider: u.provider,
            is_verified: u.is_verified,
            domains: u.domains,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Adds an existing user to the current domain with the given role.
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub email: String,
    #[serde(default = "default_member_role")]
    pub role: String,
}

fn default_member_role() -> String {
    crate::services::policy::MEMBER_ROLE.to_string()
}

/// Profile fields a domain manager may change; absent fields are kept.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub avatar: Option<String>,
}
