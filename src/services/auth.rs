use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::error::{ApiError, ApiResult, AuthError, StoreError};
use crate::models::auth::{TokenKind, TokenPair};
use crate::models::domain::Domain;
use crate::models::user::{NewUser, RegisterRequest, User};
use crate::services::credentials::CredentialStore;
use crate::services::policy::{PolicyEngine, ADMIN_ROLE};
use crate::services::session::SessionManager;
use crate::services::social::{self, IdentityProviders};

const MIN_PASSWORD_LEN: usize = 8;

/// Hashed once at startup; verified against when there is no real hash so a
/// miss costs the same as a wrong password.
const DUMMY_PASSWORD: &str = "domainauth-timing-equalizer";

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> ApiResult<()> {
    match email.split_once('@') {
        Some((local, host)) if !local.is_empty() && host.contains('.') => Ok(()),
        _ => Err(ApiError::Validation("Invalid email address".into())),
    }
}

/// Credential, refresh, social and membership flows on top of the session core.
pub struct AuthService {
    sessions: Arc<SessionManager>,
    credentials: Arc<dyn CredentialStore>,
    policy: Arc<dyn PolicyEngine>,
    providers: IdentityProviders,
    bcrypt_cost: u32,
    dummy_hash: String,
}

impl AuthService {
    pub fn new(
        sessions: Arc<SessionManager>,
        credentials: Arc<dyn CredentialStore>,
        policy: Arc<dyn PolicyEngine>,
        providers: IdentityProviders,
        bcrypt_cost: u32,
    ) -> Self {
        let dummy_hash = bcrypt::hash(DUMMY_PASSWORD, bcrypt_cost).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to hash the timing equalizer");
            String::new()
        });
        Self {
            sessions,
            credentials,
            policy,
            providers,
            bcrypt_cost,
            dummy_hash,
        }
    }

    /// Burn one bcrypt verification without a real hash to check.
    fn verify_dummy(&self, password: &str) {
        let _ = bcrypt::verify(password, &self.dummy_hash);
    }

    /// Email/password login. Unknown email, password-less account and wrong
    /// password all yield `InvalidCredentials`.
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<TokenPair> {
        let start = Instant::now();
        let email = normalize_email(email);

        let Some(user) = self.credentials.find_by_email(&email).await? else {
            self.verify_dummy(password);
            tracing::warn!(event = "login_failed", email = %email, reason = "user_not_found");
            return Err(AuthError::InvalidCredentials.into());
        };

        let valid = if user.has_password() {
            bcrypt::verify(password, &user.password_hash).unwrap_or(false)
        } else {
            self.verify_dummy(password);
            false
        };
        if !valid {
            tracing::warn!(event = "login_failed", email = %email, user_id = user.id, reason = "invalid_password");
            return Err(AuthError::InvalidCredentials.into());
        }

        let pair = self.sessions.issue_token_pair(&user).await?;
        tracing::info!(
            event = "login_success",
            user_id = user.id,
            duration_ms = start.elapsed().as_millis() as u64,
        );
        Ok(pair)
    }

    /// Trade a live refresh token for a new pair; the old pair dies with it.
    pub async fn refresh(&self, refresh_token: &str) -> ApiResult<TokenPair> {
        let claims = self
            .sessions
            .parse_token(refresh_token, TokenKind::Refresh)
            .inspect_err(|e| tracing::warn!(event = "refresh_token_invalid", error = %e))?;

        let user = self
            .sessions
            .validate_token(&claims, true)
            .await
            .inspect_err(|e| {
                tracing::warn!(event = "refresh_token_rejected", user_id = claims.id, error = %e)
            })?;

        let pair = self.sessions.issue_token_pair(&user).await?;
        tracing::info!(event = "token_refresh_success", user_id = user.id);
        Ok(pair)
    }

    pub async fn logout(&self, user_id: i64) -> ApiResult<()> {
        self.sessions.revoke(user_id).await?;
        tracing::info!(event = "logout_success", user_id);
        Ok(())
    }

    pub async fn register(&self, req: RegisterRequest) -> ApiResult<User> {
        let email = normalize_email(&req.email);
        let name = req.name.trim().to_string();
        validate_email(&email)?;
        if name.is_empty() {
            return Err(ApiError::Validation("Name is required".into()));
        }
        if req.password.len() < MIN_PASSWORD_LEN {
            return Err(ApiError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        if self.credentials.find_by_email(&email).await?.is_some() {
            return Err(ApiError::UserExists);
        }

        let password_hash = bcrypt::hash(&req.password, self.bcrypt_cost)
            .map_err(|e| AuthError::Internal(format!("bcrypt: {e}")))?;

        // The lookup above races with concurrent registrations and cannot see
        // soft-deleted users; the unique index catches both.
        let user = self
            .credentials
            .create_user(NewUser {
                name,
                email,
                password_hash,
                ..Default::default()
            })
            .await
            .map_err(|e| match e {
                StoreError::Duplicate(_) => ApiError::UserExists,
                other => other.into(),
            })?;

        tracing::info!(event = "user_registered", user_id = user.id);
        Ok(user)
    }

    /// Resolve a provider callback into a principal and open a session.
    pub async fn social_login(&self, provider: &str, code: &str) -> ApiResult<TokenPair> {
        let idp = self
            .providers
            .get(provider)
            .ok_or_else(|| ApiError::NotFound(format!("Unknown identity provider: {provider}")))?;

        let profile = idp.exchange(code).await.map_err(|e| {
            tracing::warn!(event = "social_exchange_failed", provider, error = %e);
            AuthError::InvalidCredentials
        })?;

        let user = social::find_or_create_user(self.credentials.as_ref(), &profile).await?;
        let pair = self.sessions.issue_token_pair(&user).await?;
        tracing::info!(event = "social_login_success", provider, user_id = user.id);
        Ok(pair)
    }

    /// Create a domain owned by `owner`: default policies, membership, Admin role.
    pub async fn create_domain(&self, owner: &User, name: &str) -> ApiResult<Domain> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::Validation("Domain name is required".into()));
        }

        let domain = self.credentials.create_domain(name).await?;
        let key = domain.uuid.to_string();
        self.policy.seed_domain(&key).await?;
        self.credentials
            .add_membership(domain.id, owner.id, ADMIN_ROLE)
            .await?;
        self.policy
            .assign_role(&owner.uuid.to_string(), ADMIN_ROLE, &key)
            .await?;

        tracing::info!(event = "domain_created", domain = %key, user_id = owner.id);
        Ok(domain)
    }

    /// Add an existing user to `domain` with `role`, which must be defined in
    /// that domain. Re-adding a member replaces their role.
    pub async fn add_member(&self, domain: Uuid, email: &str, role: &str) -> ApiResult<User> {
        let key = domain.to_string();
        if !self.policy.role_permissions(&key).await?.contains_key(role) {
            return Err(ApiError::Validation(format!("Unknown role: {role}")));
        }

        let stored_domain = self
            .credentials
            .find_domain(domain)
            .await?
            .ok_or_else(|| ApiError::NotFound("Domain not found".into()))?;
        let user = self
            .credentials
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

        let subject = user.uuid.to_string();
        self.credentials
            .add_membership(stored_domain.id, user.id, role)
            .await?;
        self.policy.revoke_roles(&subject, &key).await?;
        self.policy.assign_role(&subject, role, &key).await?;

        tracing::info!(event = "member_added", domain = %domain, user_id = user.id, role);
        // Reload so the returned memberships include `domain`.
        Ok(self.credentials.find_by_id(user.id).await?.unwrap_or(user))
    }

    /// Deactivate `member`'s membership of `domain` and drop their roles there.
    /// Their account and other memberships are untouched.
    pub async fn remove_member(&self, domain: Uuid, actor: &User, member: Uuid) -> ApiResult<()> {
        if actor.uuid == member {
            return Err(ApiError::Validation("You cannot remove yourself from a domain".into()));
        }
        let stored_domain = self
            .credentials
            .find_domain(domain)
            .await?
            .ok_or_else(|| ApiError::NotFound("Domain not found".into()))?;
        let user = self
            .credentials
            .find_by_uuid(member)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

        if !self
            .credentials
            .deactivate_membership(stored_domain.id, user.id)
            .await?
        {
            return Err(ApiError::NotFound("User not found".into()));
        }
        self.policy
            .revoke_roles(&member.to_string(), &domain.to_string())
            .await?;

        tracing::info!(event = "member_removed", domain = %domain, user_id = user.id, by = actor.id);
        Ok(())
    }
}
