//! Casbin-backed policy engine: RBAC with domains.
//!
//! Request: `(subject, domain, object, action)`.
//! Policy: `(role, domain, object, action)`.
//! Role assignment: `(subject, role, domain)`.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use casbin::prelude::*;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::models::policy::{Action, ResourceKind};

pub const RBAC_WITH_DOMAINS_MODEL: &str = r#"
[request_definition]
r = sub, dom, obj, act

[policy_definition]
p = sub, dom, obj, act

[role_definition]
g = _, _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub, r.dom) && r.dom == p.dom && r.obj == p.obj && r.act == p.act
"#;

pub const ADMIN_ROLE: &str = "Admin";
pub const MANAGER_ROLE: &str = "Manager";
pub const MEMBER_ROLE: &str = "Member";

/// Permissions every new domain starts with, per role.
pub fn default_role_permissions() -> Vec<(&'static str, ResourceKind, Action)> {
    use Action::*;
    use ResourceKind::*;

    let mut rules = Vec::new();
    for kind in ResourceKind::ALL {
        for action in Action::ALL {
            rules.push((ADMIN_ROLE, kind, action));
        }
    }
    for action in [List, Read, Update] {
        rules.push((MANAGER_ROLE, User, action));
    }
    for action in Action::ALL {
        rules.push((MANAGER_ROLE, Post, action));
    }
    for kind in [User, Post, Domain] {
        for action in [List, Read] {
            rules.push((MEMBER_ROLE, kind, action));
        }
    }
    rules
}

#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Domains in which `subject` holds any role.
    async fn domains_for_subject(&self, subject: &str) -> StoreResult<Vec<String>>;

    /// Argument order is part of the policy model and must not be permuted.
    async fn enforce(&self, subject: &str, domain: &str, object: &str, action: &str) -> StoreResult<bool>;

    async fn assign_role(&self, subject: &str, role: &str, domain: &str) -> StoreResult<()>;

    /// Drop every role `subject` holds in `domain`.
    async fn revoke_roles(&self, subject: &str, domain: &str) -> StoreResult<()>;

    /// Subjects holding `role` in `domain`.
    async fn role_holders(&self, role: &str, domain: &str) -> StoreResult<Vec<String>>;

    /// `(object, action)` grants of every role defined in `domain`. A role
    /// exists in a domain exactly when it has at least one grant there.
    async fn role_permissions(&self, domain: &str) -> StoreResult<BTreeMap<String, Vec<(String, String)>>>;

    /// Replace the grants of `role` in `domain`.
    async fn set_role_permissions(&self, role: &str, domain: &str, grants: &[(String, String)]) -> StoreResult<()>;

    /// Remove the grants of `role` in `domain`. Assignments are left alone.
    async fn delete_role(&self, role: &str, domain: &str) -> StoreResult<()>;

    /// Install the default role permissions for a domain that has no policy
    /// yet. A domain whose roles were already customized is left as is.
    async fn seed_domain(&self, domain: &str) -> StoreResult<()>;
}

pub struct CasbinPolicyEngine {
    enforcer: RwLock<Enforcer>,
}

impl CasbinPolicyEngine {
    /// Policy held in memory only; lost on restart.
    pub async fn in_memory() -> StoreResult<Self> {
        let model = DefaultModel::from_str(RBAC_WITH_DOMAINS_MODEL).await?;
        let enforcer = Enforcer::new(model, MemoryAdapter::default()).await?;
        Ok(Self {
            enforcer: RwLock::new(enforcer),
        })
    }

    /// Policy loaded from, and saved back to, a CSV file. A missing file is
    /// created empty.
    pub async fn from_file(path: &str) -> StoreResult<Self> {
        if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::Other(format!("policy dir {}: {e}", dir.display())))?;
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| StoreError::Other(format!("policy file {path}: {e}")))?;

        let model = DefaultModel::from_str(RBAC_WITH_DOMAINS_MODEL).await?;
        let enforcer = Enforcer::new(model, FileAdapter::new(path.to_string())).await?;
        tracing::info!(path, "policy loaded");
        Ok(Self {
            enforcer: RwLock::new(enforcer),
        })
    }
}

#[async_trait]
impl PolicyEngine for CasbinPolicyEngine {
    async fn domains_for_subject(&self, subject: &str) -> StoreResult<Vec<String>> {
        let enforcer = self.enforcer.read().await;
        let mut domains: Vec<String> = enforcer
            .get_filtered_grouping_policy(0, vec![subject.to_string()])
            .into_iter()
            .filter_map(|rule| rule.get(2).cloned())
            .collect();
        domains.sort();
        domains.dedup();
        Ok(domains)
    }

    async fn enforce(&self, subject: &str, domain: &str, object: &str, action: &str) -> StoreResult<bool> {
        let enforcer = self.enforcer.read().await;
        Ok(enforcer.enforce((subject, domain, object, action))?)
    }

    async fn assign_role(&self, subject: &str, role: &str, domain: &str) -> StoreResult<()> {
        let mut enforcer = self.enforcer.write().await;
        let added = enforcer
            .add_grouping_policy(vec![subject.to_string(), role.to_string(), domain.to_string()])
            .await?;
        if added {
            enforcer.save_policy().await?;
        }
        Ok(())
    }

    async fn revoke_roles(&self, subject: &str, domain: &str) -> StoreResult<()> {
        let mut enforcer = self.enforcer.write().await;
        let rules: Vec<Vec<String>> = enforcer
            .get_filtered_grouping_policy(0, vec![subject.to_string()])
            .into_iter()
            .filter(|rule| rule.get(2).map(String::as_str) == Some(domain))
            .collect();
        if !rules.is_empty() && enforcer.remove_grouping_policies(rules).await? {
            enforcer.save_policy().await?;
        }
        Ok(())
    }

    async fn role_holders(&self, role: &str, domain: &str) -> StoreResult<Vec<String>> {
        let enforcer = self.enforcer.read().await;
        Ok(enforcer
            .get_filtered_grouping_policy(1, vec![role.to_string(), domain.to_string()])
            .into_iter()
            .filter_map(|rule| rule.into_iter().next())
            .collect())
    }

    async fn role_permissions(&self, domain: &str) -> StoreResult<BTreeMap<String, Vec<(String, String)>>> {
        let enforcer = self.enforcer.read().await;
        let mut roles: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        for rule in enforcer.get_filtered_policy(1, vec![domain.to_string()]) {
            if let [role, _, object, action] = rule.as_slice() {
                roles
                    .entry(role.clone())
                    .or_default()
                    .push((object.clone(), action.clone()));
            }
        }
        Ok(roles)
    }

    async fn set_role_permissions(&self, role: &str, domain: &str, grants: &[(String, String)]) -> StoreResult<()> {
        let mut enforcer = self.enforcer.write().await;
        let existing = enforcer.get_filtered_policy(0, vec![role.to_string(), domain.to_string()]);
        if !existing.is_empty() {
            enforcer.remove_policies(existing).await?;
        }
        let mut rules: Vec<Vec<String>> = grants
            .iter()
            .map(|(object, action)| {
                vec![role.to_string(), domain.to_string(), object.clone(), action.clone()]
            })
            .collect();
        rules.sort();
        rules.dedup();
        if !rules.is_empty() {
            enforcer.add_policies(rules).await?;
        }
        enforcer.save_policy().await?;
        Ok(())
    }

    async fn delete_role(&self, role: &str, domain: &str) -> StoreResult<()> {
        let mut enforcer = self.enforcer.write().await;
        let existing = enforcer.get_filtered_policy(0, vec![role.to_string(), domain.to_string()]);
        if !existing.is_empty() && enforcer.remove_policies(existing).await? {
            enforcer.save_policy().await?;
        }
        Ok(())
    }

    async fn seed_domain(&self, domain: &str) -> StoreResult<()> {
        let mut enforcer = self.enforcer.write().await;
        if !enforcer.get_filtered_policy(1, vec![domain.to_string()]).is_empty() {
            return Ok(());
        }
        let rules: Vec<Vec<String>> = default_role_permissions()
            .into_iter()
            .map(|(role, kind, action)| {
                vec![
                    role.to_string(),
                    domain.to_string(),
                    kind.as_str().to_string(),
                    action.as_str().to_string(),
                ]
            })
            .collect();
        if enforcer.add_policies(rules).await? {
            enforcer.save_policy().await?;
        }
        Ok(())
    }
}
