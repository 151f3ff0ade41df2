use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A post belongs to exactly one domain and is invisible from every other.
#[derive(Debug, Clone, Serialize, FromRow, PartialEq)]
pub struct Post {
    #[serde(skip_serializing)]
    pub id: i64,
    pub uuid: Uuid,
    pub domain: Uuid,
    pub author: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of both create and update; an update replaces both fields.
#[derive(Debug, Clone, Deserialize)]
pub struct PostRequest {
    pub title: String,
    #[serde(default)]
    pub content: String,
}
