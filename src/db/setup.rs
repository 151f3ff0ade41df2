//! Startup steps, run once in the order `main` lists them.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::services::credentials::CredentialStore;
use crate::services::policy::PolicyEngine;

#[async_trait]
pub trait Setup: Send + Sync {
    fn name(&self) -> &'static str;

    /// Must be idempotent: every setup runs on every startup.
    async fn run(&self) -> anyhow::Result<()>;
}

/// Run `setups` in order, stopping at the first failure.
pub async fn run_setups(setups: &[&dyn Setup]) -> anyhow::Result<()> {
    for setup in setups {
        setup
            .run()
            .await
            .map_err(|e| anyhow::anyhow!("setup {} failed: {e}", setup.name()))?;
        tracing::info!(setup = setup.name(), "setup complete");
    }
    Ok(())
}

/// Migrations embedded from ./migrations/
pub struct Migrations {
    pub pool: PgPool,
}

#[async_trait]
impl Setup for Migrations {
    fn name(&self) -> &'static str {
        "migrations"
    }

    async fn run(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Seed default permissions for every stored domain that has none, then
/// replay every active membership's role. The policy store may be empty or
/// stale after a restart; memberships are the record of who holds what.
pub struct DefaultPolicies {
    pub credentials: Arc<dyn CredentialStore>,
    pub policy: Arc<dyn PolicyEngine>,
}

#[async_trait]
impl Setup for DefaultPolicies {
    fn name(&self) -> &'static str {
        "default-policies"
    }

    async fn run(&self) -> anyhow::Result<()> {
        let domains = self.credentials.list_domains().await?;
        for domain in &domains {
            self.policy.seed_domain(&domain.uuid.to_string()).await?;
        }

        let memberships = self.credentials.list_memberships().await?;
        for membership in &memberships {
            self.policy
                .assign_role(
                    &membership.user.to_string(),
                    &membership.role,
                    &membership.domain.to_string(),
                )
                .await?;
        }
        tracing::info!(
            domains = domains.len(),
            memberships = memberships.len(),
            "default policies seeded"
        );
        Ok(())
    }
}
