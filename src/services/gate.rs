//! Domain and resource authorization gates.
//!
//! `authorize_domain` is the only way to obtain a `DomainContext`, and
//! `authorize_resource` requires one, so the resource check cannot run on a
//! domain that has not been vetted.

use uuid::Uuid;

use crate::error::AuthError;
use crate::models::auth::{AuthContext, DomainContext};
use crate::models::policy::{Action, ResourceKind};
use crate::services::policy::PolicyEngine;

/// Pass iff the policy engine knows the principal in `domain`.
///
/// The token's embedded domain snapshot is not consulted.
pub async fn authorize_domain(
    policy: &dyn PolicyEngine,
    auth: AuthContext,
    domain: Uuid,
) -> Result<DomainContext, AuthError> {
    let subject = auth.user.uuid.to_string();
    let requested = domain.to_string();

    let domains = policy.domains_for_subject(&subject).await?;
    if !domains.iter().any(|d| *d == requested) {
        tracing::warn!(
            event = "domain_denied",
            user_id = auth.user.id,
            domain = %requested,
            "domain authorization failed"
        );
        return Err(AuthError::CasbinUnauthorized);
    }

    Ok(DomainContext::new(auth, domain))
}

/// Per-action permission check; an engine failure never allows.
pub async fn authorize_resource(
    policy: &dyn PolicyEngine,
    ctx: &DomainContext,
    resource: ResourceKind,
    action: Action,
) -> Result<(), AuthError> {
    let subject = ctx.user().uuid.to_string();
    let domain = ctx.domain.to_string();

    let allowed = policy
        .enforce(&subject, &domain, resource.as_str(), action.as_str())
        .await?;
    if !allowed {
        tracing::warn!(
            event = "resource_denied",
            user_id = ctx.user().id,
            domain = %domain,
            resource = %resource,
            action = %action,
            "resource authorization failed"
        );
        return Err(AuthError::CasbinUnauthorized);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use async_trait::async_trait;

    use crate::error::{StoreError, StoreResult};
    use crate::models::auth::SessionClaims;
    use crate::models::user::User;
    use crate::services::policy::{CasbinPolicyEngine, ADMIN_ROLE, MEMBER_ROLE};

    struct BrokenEngine;

    #[async_trait]
    impl PolicyEngine for BrokenEngine {
        async fn domains_for_subject(&self, _: &str) -> StoreResult<Vec<String>> {
            Err(StoreError::Other("adapter offline".into()))
        }
        async fn enforce(&self, _: &str, _: &str, _: &str, _: &str) -> StoreResult<bool> {
            Err(StoreError::Other("adapter offline".into()))
        }
        async fn assign_role(&self, _: &str, _: &str, _: &str) -> StoreResult<()> {
            Ok(())
        }
        async fn revoke_roles(&self, _: &str, _: &str) -> StoreResult<()> {
            Ok(())
        }
        async fn role_holders(&self, _: &str, _: &str) -> StoreResult<Vec<String>> {
            Ok(vec![])
        }
        async fn role_permissions(&self, _: &str) -> StoreResult<BTreeMap<String, Vec<(String, String)>>> {
            Ok(BTreeMap::new())
        }
        async fn set_role_permissions(&self, _: &str, _: &str, _: &[(String, String)]) -> StoreResult<()> {
            Ok(())
        }
        async fn delete_role(&self, _: &str, _: &str) -> StoreResult<()> {
            Ok(())
        }
        async fn seed_domain(&self, _: &str) -> StoreResult<()> {
            Ok(())
        }
    }

    fn auth_context() -> AuthContext {
        let user = User {
            id: 7,
            uuid: Uuid::new_v4(),
            name: "Pat".into(),
            email: "pat@example.com".into(),
            password_hash: String::new(),
            avatar: None,
            provider: None,
            provider_id: None,
            is_verified: true,
            domains: vec![],
        };
        let claims = SessionClaims {
            uid: "uid".into(),
            id: user.id,
            uuid: user.uuid,
            name: user.name.clone(),
            domains: vec![],
            iss: "test".into(),
            iat: 0,
            exp: 0,
        };
        AuthContext { user, claims }
    }

    #[tokio::test]
    async fn domain_gate_passes_member_and_rejects_other_domain() {
        let engine = CasbinPolicyEngine::in_memory().await.unwrap();
        let auth = auth_context();
        let (d1, d2) = (Uuid::new_v4(), Uuid::new_v4());
        engine
            .assign_role(&auth.user.uuid.to_string(), MEMBER_ROLE, &d1.to_string())
            .await
            .unwrap();

        let err = authorize_domain(&engine, auth.clone(), d2).await.unwrap_err();
        assert_eq!(err, AuthError::CasbinUnauthorized);

        let ctx = authorize_domain(&engine, auth, d1).await.unwrap();
        assert_eq!(ctx.domain, d1);
    }

    #[tokio::test]
    async fn resource_gate_follows_enforce_result() {
        let engine = CasbinPolicyEngine::in_memory().await.unwrap();
        let auth = auth_context();
        let d1 = Uuid::new_v4();
        engine.seed_domain(&d1.to_string()).await.unwrap();
        engine
            .assign_role(&auth.user.uuid.to_string(), MEMBER_ROLE, &d1.to_string())
            .await
            .unwrap();

        let ctx = authorize_domain(&engine, auth.clone(), d1).await.unwrap();
        let err = authorize_resource(&engine, &ctx, ResourceKind::Post, Action::Delete)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::CasbinUnauthorized);
        authorize_resource(&engine, &ctx, ResourceKind::Post, Action::Read)
            .await
            .unwrap();

        engine
            .assign_role(&auth.user.uuid.to_string(), ADMIN_ROLE, &d1.to_string())
            .await
            .unwrap();
        authorize_resource(&engine, &ctx, ResourceKind::Post, Action::Delete)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn engine_failures_are_internal_not_allow() {
        let auth = auth_context();
        let d1 = Uuid::new_v4();

        let err = authorize_domain(&BrokenEngine, auth.clone(), d1).await.unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));

        let ctx = DomainContext::new(auth, d1);
        let err = authorize_resource(&BrokenEngine, &ctx, ResourceKind::User, Action::List)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
    }
}
