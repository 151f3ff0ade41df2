use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A tenant. Users join through `domain_users`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Domain {
    #[serde(skip_serializing)]
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// The `{uuid, name}` pair snapshotted into session claims.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct DomainRef {
    pub uuid: Uuid,
    pub name: String,
}

impl From<&Domain> for DomainRef {
    fn from(d: &Domain) -> Self {
        Self {
            uuid: d.uuid,
            name: d.name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateDomainRequest {
    pub name: String,
}

/// An active membership and the role it grants, as persisted. The policy
/// engine's role assignments are rebuilt from these.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Membership {
    pub domain: Uuid,
    pub user: Uuid,
    pub role: String,
}
