//! Persistent users, domains and memberships.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::domain::{Domain, DomainRef, Membership};
use crate::models::user::{NewUser, User};

/// Every lookup returning a `User` attaches its active domain memberships.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>>;

    async fn find_by_uuid(&self, uuid: Uuid) -> StoreResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_provider(&self, provider: &str, provider_id: &str) -> StoreResult<Option<User>>;

    async fn domains_for_user(&self, user_id: i64) -> StoreResult<Vec<DomainRef>>;

    /// Fails with `StoreError::Duplicate` when the email is taken, including
    /// by a soft-deleted user.
    async fn create_user(&self, new: NewUser) -> StoreResult<User>;

    /// Persist profile and provider fields of an existing user.
    async fn update_user(&self, user: &User) -> StoreResult<()>;

    async fn create_domain(&self, name: &str) -> StoreResult<Domain>;

    async fn find_domain(&self, uuid: Uuid) -> StoreResult<Option<Domain>>;

    async fn list_domains(&self) -> StoreResult<Vec<Domain>>;

    /// Idempotent; reactivates an inactive membership and overwrites its role.
    async fn add_membership(&self, domain_id: i64, user_id: i64, role: &str) -> StoreResult<()>;

    /// Returns false when there was no active membership.
    async fn deactivate_membership(&self, domain_id: i64, user_id: i64) -> StoreResult<bool>;

    /// Every active membership of every domain.
    async fn list_memberships(&self) -> StoreResult<Vec<Membership>>;

    async fn list_domain_members(&self, domain: Uuid) -> StoreResult<Vec<User>>;

    async fn ping(&self) -> StoreResult<()>;
}

const USER_COLUMNS: &str =
    "id, uuid, name, email, password_hash, avatar, provider, provider_id, is_verified";

/// PostgreSQL-backed store. Soft-deleted users are invisible.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_domains(&self, user: Option<User>) -> StoreResult<Option<User>> {
        match user {
            Some(mut user) => {
                user.domains = self.domains_for_user(user.id).await?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.with_domains(user).await
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE uuid = $1 AND deleted_at IS NULL"
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        self.with_domains(user).await
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted_at IS NULL"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        self.with_domains(user).await
    }

    async fn find_by_provider(&self, provider: &str, provider_id: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE provider = $1 AND provider_id = $2 AND deleted_at IS NULL"
        ))
        .bind(provider)
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;
        self.with_domains(user).await
    }

    async fn domains_for_user(&self, user_id: i64) -> StoreResult<Vec<DomainRef>> {
        let domains = sqlx::query_as::<_, DomainRef>(
            "SELECT d.uuid, d.name
             FROM domains d
             JOIN domain_users du ON du.domain_id = d.id
             WHERE du.user_id = $1 AND du.active = TRUE
             ORDER BY d.name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(domains)
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (uuid, name, email, password_hash, avatar, provider, provider_id, is_verified)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.avatar)
        .bind(&new.provider)
        .bind(&new.provider_id)
        .bind(new.is_verified)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // A concurrent registration, or a soft-deleted row holding the email.
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return StoreError::Duplicate(format!("email {}", new.email));
                }
            }
            StoreError::Database(e)
        })?;
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users
             SET name = $2, email = $3, avatar = $4, provider = $5, provider_id = $6,
                 is_verified = $7, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.avatar)
        .bind(&user.provider)
        .bind(&user.provider_id)
        .bind(user.is_verified)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_domain(&self, name: &str) -> StoreResult<Domain> {
        let domain = sqlx::query_as::<_, Domain>(
            "INSERT INTO domains (uuid, name) VALUES ($1, $2)
             RETURNING id, uuid, name, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(domain)
    }

    async fn find_domain(&self, uuid: Uuid) -> StoreResult<Option<Domain>> {
        let domain = sqlx::query_as::<_, Domain>(
            "SELECT id, uuid, name, created_at FROM domains WHERE uuid = $1",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(domain)
    }

    async fn list_domains(&self) -> StoreResult<Vec<Domain>> {
        let domains = sqlx::query_as::<_, Domain>(
            "SELECT id, uuid, name, created_at FROM domains ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(domains)
    }

    async fn add_membership(&self, domain_id: i64, user_id: i64, role: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO domain_users (domain_id, user_id, role, active) VALUES ($1, $2, $3, TRUE)
             ON CONFLICT (domain_id, user_id) DO UPDATE SET active = TRUE, role = EXCLUDED.role",
        )
        .bind(domain_id)
        .bind(user_id)
        .bind(role)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deactivate_membership(&self, domain_id: i64, user_id: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE domain_users SET active = FALSE
             WHERE domain_id = $1 AND user_id = $2 AND active = TRUE",
        )
        .bind(domain_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_memberships(&self) -> StoreResult<Vec<Membership>> {
        let memberships = sqlx::query_as::<_, Membership>(
            r#"SELECT d.uuid AS domain, u.uuid AS "user", du.role
             FROM domain_users du
             JOIN domains d ON d.id = du.domain_id
             JOIN users u ON u.id = du.user_id
             WHERE du.active = TRUE AND u.deleted_at IS NULL
             ORDER BY du.domain_id, du.user_id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(memberships)
    }

    async fn list_domain_members(&self, domain: Uuid) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT u.id, u.uuid, u.name, u.email, u.password_hash, u.avatar,
                    u.provider, u.provider_id, u.is_verified
             FROM users u
             JOIN domain_users du ON du.user_id = u.id AND du.active = TRUE
             JOIN domains d ON d.id = du.domain_id
             WHERE d.uuid = $1 AND u.deleted_at IS NULL
             ORDER BY u.name",
        )
        .bind(domain)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct MemoryMembership {
    domain_id: i64,
    user_id: i64,
    role: String,
    active: bool,
}

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    /// Soft-deleted user ids; their rows still reserve their email.
    deleted: HashSet<i64>,
    domains: Vec<Domain>,
    memberships: Vec<MemoryMembership>,
}

impl MemoryState {
    fn live_user(&self, pred: impl Fn(&User) -> bool) -> Option<&User> {
        self.users
            .iter()
            .find(|u| !self.deleted.contains(&u.id) && pred(u))
    }

    fn domains_for(&self, user_id: i64) -> Vec<DomainRef> {
        let mut refs: Vec<DomainRef> = self
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.active)
            .filter_map(|m| self.domains.iter().find(|d| d.id == m.domain_id))
            .map(DomainRef::from)
            .collect();
        refs.sort_by(|a, b| a.name.cmp(&b.name));
        refs
    }

    fn hydrate(&self, user: Option<&User>) -> Option<User> {
        user.map(|u| User {
            domains: self.domains_for(u.id),
            ..u.clone()
        })
    }
}

/// In-process store for tests and local development.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: RwLock<MemoryState>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Soft-delete a user, as an administrator would.
    pub async fn remove_user(&self, id: i64) {
        self.state.write().await.deleted.insert(id);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.hydrate(state.live_user(|u| u.id == id)))
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.hydrate(state.live_user(|u| u.uuid == uuid)))
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.hydrate(state.live_user(|u| u.email == email)))
    }

    async fn find_by_provider(&self, provider: &str, provider_id: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.hydrate(state.live_user(|u| {
            u.provider.as_deref() == Some(provider) && u.provider_id.as_deref() == Some(provider_id)
        })))
    }

    async fn domains_for_user(&self, user_id: i64) -> StoreResult<Vec<DomainRef>> {
        Ok(self.state.read().await.domains_for(user_id))
    }

    async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if state.users.iter().any(|u| u.email == new.email) {
            return Err(StoreError::Duplicate(format!("email {}", new.email)));
        }
        let user = User {
            id: state.users.iter().map(|u| u.id).max().unwrap_or(0) + 1,
            uuid: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            avatar: new.avatar,
            provider: new.provider,
            provider_id: new.provider_id,
            is_verified: new.is_verified,
            domains: vec![],
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| StoreError::Other(format!("user {} not found", user.id)))?;
        *stored = User {
            password_hash: stored.password_hash.clone(),
            domains: vec![],
            ..user.clone()
        };
        Ok(())
    }

    async fn create_domain(&self, name: &str) -> StoreResult<Domain> {
        let mut state = self.state.write().await;
        let domain = Domain {
            id: state.domains.iter().map(|d| d.id).max().unwrap_or(0) + 1,
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        state.domains.push(domain.clone());
        Ok(domain)
    }

    async fn find_domain(&self, uuid: Uuid) -> StoreResult<Option<Domain>> {
        let state = self.state.read().await;
        Ok(state.domains.iter().find(|d| d.uuid == uuid).cloned())
    }

    async fn list_domains(&self) -> StoreResult<Vec<Domain>> {
        Ok(self.state.read().await.domains.clone())
    }

    async fn add_membership(&self, domain_id: i64, user_id: i64, role: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        match state
            .memberships
            .iter_mut()
            .find(|m| m.domain_id == domain_id && m.user_id == user_id)
        {
            Some(existing) => {
                existing.active = true;
                existing.role = role.to_string();
            }
            None => state.memberships.push(MemoryMembership {
                domain_id,
                user_id,
                role: role.to_string(),
                active: true,
            }),
        }
        Ok(())
    }

    async fn deactivate_membership(&self, domain_id: i64, user_id: i64) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let membership = state
            .memberships
            .iter_mut()
            .find(|m| m.domain_id == domain_id && m.user_id == user_id && m.active);
        Ok(match membership {
            Some(m) => {
                m.active = false;
                true
            }
            None => false,
        })
    }

    async fn list_memberships(&self) -> StoreResult<Vec<Membership>> {
        let state = self.state.read().await;
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.active && !state.deleted.contains(&m.user_id))
            .filter_map(|m| {
                let domain = state.domains.iter().find(|d| d.id == m.domain_id)?;
                let user = state.users.iter().find(|u| u.id == m.user_id)?;
                Some(Membership {
                    domain: domain.uuid,
                    user: user.uuid,
                    role: m.role.clone(),
                })
            })
            .collect())
    }

    async fn list_domain_members(&self, domain: Uuid) -> StoreResult<Vec<User>> {
        let state = self.state.read().await;
        let Some(domain) = state.domains.iter().find(|d| d.uuid == domain) else {
            return Ok(vec![]);
        };
        let mut members: Vec<User> = state
            .memberships
            .iter()
            .filter(|m| m.domain_id == domain.id && m.active)
            .filter_map(|m| state.live_user(|u| u.id == m.user_id))
            .cloned()
            .collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(members)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
