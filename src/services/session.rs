//! Session issuance, liveness validation and sliding renewal.
//!
//! A session is live iff `token-<id>` exists in the session cache and holds
//! the uid carried by the presented token. Signature and `exp` alone never
//! make a session live.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::AuthError;
use crate::models::auth::{CachedTokens, SessionClaims, TokenKind, TokenPair};
use crate::models::user::User;
use crate::services::credentials::CredentialStore;
use crate::services::session_cache::{token_key, SessionCache};
use crate::services::token::TokenCodec;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Idle window after which the cached pair lapses.
    pub auto_logoff: Duration,
    /// Upper bound on one background TTL renewal.
    pub renew_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            auto_logoff: Duration::from_secs(10 * 60),
            renew_timeout: Duration::from_secs(5),
        }
    }
}

pub struct SessionManager {
    codec: TokenCodec,
    cache: Arc<dyn SessionCache>,
    credentials: Arc<dyn CredentialStore>,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(
        codec: TokenCodec,
        cache: Arc<dyn SessionCache>,
        credentials: Arc<dyn CredentialStore>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            codec,
            cache,
            credentials,
            settings,
        }
    }

    /// Issue a fresh access/refresh pair and make it the only live pair for
    /// `user`, orphaning whatever was issued before.
    pub async fn issue_token_pair(&self, user: &User) -> Result<TokenPair, AuthError> {
        // The snapshot must reflect membership now, not whatever `user` carries.
        let domains = self.credentials.domains_for_user(user.id).await?;

        let access_uid = Uuid::new_v4().to_string();
        let refresh_uid = Uuid::new_v4().to_string();

        let (access_token, expires_at) =
            self.codec
                .encode(TokenKind::Access, user, &domains, access_uid.clone())?;
        let (refresh_token, _) =
            self.codec
                .encode(TokenKind::Refresh, user, &domains, refresh_uid.clone())?;

        let record = serde_json::to_string(&CachedTokens {
            access_uid,
            refresh_uid,
        })
        .map_err(|e| AuthError::Internal(format!("encode cached tokens: {e}")))?;

        // Without this record the pair could never validate, so a write
        // failure fails the issuance.
        self.cache
            .set(&token_key(user.id), &record, self.settings.auto_logoff)
            .await?;

        tracing::debug!(user_id = user.id, "token pair issued");

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    /// Verify a presented token with the secret of `kind`.
    pub fn parse_token(&self, token: &str, kind: TokenKind) -> Result<SessionClaims, AuthError> {
        self.codec.decode(kind, token)
    }

    /// Confirm the session behind `claims` is live and load its principal.
    ///
    /// Both lookups run concurrently; the first failure is the result.
    pub async fn validate_token(&self, claims: &SessionClaims, is_refresh: bool) -> Result<User, AuthError> {
        let ((), user) = tokio::try_join!(
            self.check_liveness(claims, is_refresh),
            self.load_principal(claims.id),
        )?;
        Ok(user)
    }

    async fn check_liveness(&self, claims: &SessionClaims, is_refresh: bool) -> Result<(), AuthError> {
        let raw = self.cache.get(&token_key(claims.id)).await?;

        // An undecodable record counts as a miss.
        let cached = raw.and_then(|r| serde_json::from_str::<CachedTokens>(&r).ok());
        match cached {
            Some(tokens) if tokens.uid_for(is_refresh) == claims.uid => Ok(()),
            _ => Err(AuthError::TokenExpired),
        }
    }

    async fn load_principal(&self, id: i64) -> Result<User, AuthError> {
        self.credentials
            .find_by_id(id)
            .await?
            .filter(|u| u.id != 0)
            .ok_or(AuthError::UserNotFound)
    }

    /// Push the pair's TTL back to the full auto-logoff window.
    ///
    /// Runs detached with its own timeout so request cancellation cannot cut
    /// it short. Failures are logged and dropped. The handle is only useful
    /// to tests; callers normally drop it.
    pub fn renew(&self, user_id: i64) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let ttl = self.settings.auto_logoff;
        let limit = self.settings.renew_timeout;

        tokio::spawn(async move {
            match tokio::time::timeout(limit, cache.expire(&token_key(user_id), ttl)).await {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    tracing::debug!(user_id, "session lapsed before renewal");
                }
                Ok(Err(e)) => {
                    tracing::warn!(user_id, error = %e, "session renewal failed");
                }
                Err(_) => {
                    tracing::warn!(user_id, "session renewal timed out");
                }
            }
        })
    }

    /// End the session of `user_id` regardless of remaining TTL.
    pub async fn revoke(&self, user_id: i64) -> Result<(), AuthError> {
        self.cache.delete(&token_key(user_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use jsonwebtoken::Algorithm;

    use crate::error::{StoreError, StoreResult};
    use crate::models::user::NewUser;
    use crate::services::credentials::MemoryCredentialStore;
    use crate::services::policy::MEMBER_ROLE;
    use crate::services::session_cache::MemorySessionCache;
    use crate::services::token::TokenSettings;

    struct Harness {
        sessions: SessionManager,
        cache: Arc<MemorySessionCache>,
        store: Arc<MemoryCredentialStore>,
    }

    fn codec() -> TokenCodec {
        TokenCodec::new(
            TokenSettings::new(
                "access-secret".into(),
                "refresh-secret".into(),
                Algorithm::HS256,
                "test".into(),
                Duration::from_secs(30 * 60),
                Duration::from_secs(2 * 60 * 60),
            )
            .unwrap(),
        )
    }

    fn harness() -> Harness {
        let cache = Arc::new(MemorySessionCache::new());
        let store = Arc::new(MemoryCredentialStore::new());
        let sessions = SessionManager::new(
            codec(),
            cache.clone(),
            store.clone(),
            SessionSettings::default(),
        );
        Harness {
            sessions,
            cache,
            store,
        }
    }

    async fn user(store: &MemoryCredentialStore) -> User {
        store
            .create_user(NewUser {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn issued_pair_validates() {
        let h = harness();
        let user = user(&h.store).await;

        let pair = h.sessions.issue_token_pair(&user).await.unwrap();
        let access = h.sessions.parse_token(&pair.access_token, TokenKind::Access).unwrap();
        let refresh = h.sessions.parse_token(&pair.refresh_token, TokenKind::Refresh).unwrap();

        assert_ne!(access.uid, refresh.uid);
        assert_eq!(pair.expires_at, access.exp);
        assert_eq!(h.sessions.validate_token(&access, false).await.unwrap().id, user.id);
        assert_eq!(h.sessions.validate_token(&refresh, true).await.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn claims_snapshot_reflects_current_membership() {
        let h = harness();
        let mut user = user(&h.store).await;
        let acme = h.store.create_domain("Acme").await.unwrap();
        h.store.add_membership(acme.id, user.id, MEMBER_ROLE).await.unwrap();
        user.domains.clear();

        let pair = h.sessions.issue_token_pair(&user).await.unwrap();
        let claims = h.sessions.parse_token(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(claims.domains.len(), 1);
        assert_eq!(claims.domains[0].uuid, acme.uuid);
    }

    #[tokio::test]
    async fn reissue_orphans_previous_pair() {
        let h = harness();
        let user = user(&h.store).await;

        let first = h.sessions.issue_token_pair(&user).await.unwrap();
        let second = h.sessions.issue_token_pair(&user).await.unwrap();

        let old_access = h.sessions.parse_token(&first.access_token, TokenKind::Access).unwrap();
        let old_refresh = h.sessions.parse_token(&first.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(h.sessions.validate_token(&old_access, false).await.unwrap_err(), AuthError::TokenExpired);
        assert_eq!(h.sessions.validate_token(&old_refresh, true).await.unwrap_err(), AuthError::TokenExpired);

        let new_access = h.sessions.parse_token(&second.access_token, TokenKind::Access).unwrap();
        assert!(h.sessions.validate_token(&new_access, false).await.is_ok());
    }

    #[tokio::test]
    async fn revoke_ends_both_tokens() {
        let h = harness();
        let user = user(&h.store).await;
        let pair = h.sessions.issue_token_pair(&user).await.unwrap();
        let access = h.sessions.parse_token(&pair.access_token, TokenKind::Access).unwrap();
        let refresh = h.sessions.parse_token(&pair.refresh_token, TokenKind::Refresh).unwrap();

        h.sessions.revoke(user.id).await.unwrap();

        assert_eq!(h.sessions.validate_token(&access, false).await.unwrap_err(), AuthError::TokenExpired);
        assert_eq!(h.sessions.validate_token(&refresh, true).await.unwrap_err(), AuthError::TokenExpired);
    }

    #[tokio::test]
    async fn access_claims_do_not_pass_as_refresh() {
        let h = harness();
        let user = user(&h.store).await;
        let pair = h.sessions.issue_token_pair(&user).await.unwrap();
        let access = h.sessions.parse_token(&pair.access_token, TokenKind::Access).unwrap();

        assert_eq!(h.sessions.validate_token(&access, true).await.unwrap_err(), AuthError::TokenExpired);
    }

    #[tokio::test]
    async fn deleted_user_with_live_cache_is_user_not_found() {
        let h = harness();
        let user = user(&h.store).await;
        let pair = h.sessions.issue_token_pair(&user).await.unwrap();
        let access = h.sessions.parse_token(&pair.access_token, TokenKind::Access).unwrap();

        h.store.remove_user(user.id).await;

        assert_eq!(h.sessions.validate_token(&access, false).await.unwrap_err(), AuthError::UserNotFound);
    }

    #[tokio::test]
    async fn corrupt_cache_record_is_a_miss() {
        let h = harness();
        let user = user(&h.store).await;
        let pair = h.sessions.issue_token_pair(&user).await.unwrap();
        let access = h.sessions.parse_token(&pair.access_token, TokenKind::Access).unwrap();

        h.cache
            .set(&token_key(user.id), "{not json", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(h.sessions.validate_token(&access, false).await.unwrap_err(), AuthError::TokenExpired);
    }

    struct ReadOnlyCache;

    #[async_trait]
    impl SessionCache for ReadOnlyCache {
        async fn get(&self, _: &str) -> StoreResult<Option<String>> {
            Ok(None)
        }
        async fn set(&self, _: &str, _: &str, _: Duration) -> StoreResult<()> {
            Err(StoreError::Other("READONLY".into()))
        }
        async fn delete(&self, _: &str) -> StoreResult<()> {
            Ok(())
        }
        async fn expire(&self, _: &str, _: Duration) -> StoreResult<bool> {
            Err(StoreError::Other("READONLY".into()))
        }
        async fn ping(&self) -> StoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn cache_write_failure_fails_issuance() {
        let store = Arc::new(MemoryCredentialStore::new());
        let sessions = SessionManager::new(
            codec(),
            Arc::new(ReadOnlyCache),
            store.clone(),
            SessionSettings::default(),
        );
        let user = user(&store).await;

        let err = sessions.issue_token_pair(&user).await.unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
    }

    #[tokio::test]
    async fn renewal_failure_is_swallowed() {
        let store = Arc::new(MemoryCredentialStore::new());
        let sessions = SessionManager::new(
            codec(),
            Arc::new(ReadOnlyCache),
            store,
            SessionSettings::default(),
        );

        // The task completes normally even though `expire` errors.
        sessions.renew(1).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_resets_ttl() {
        let h = harness();
        let user = user(&h.store).await;
        h.sessions.issue_token_pair(&user).await.unwrap();

        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        h.sessions.renew(user.id).await.unwrap();

        assert_eq!(h.cache.ttl(&token_key(user.id)).await, Some(Duration::from_secs(10 * 60)));
    }
}
