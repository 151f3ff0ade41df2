//! Roles of the current domain, stored as policy grants. A role exists in a
//! domain exactly while it has at least one grant there.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    error::{ApiError, ApiResult},
    models::{
        auth::DomainContext,
        policy::{CreateRoleRequest, Permission, ResourceKind, Role, UpdateRoleRequest},
    },
    routes::resources::ResourceHandler,
    services::policy::ADMIN_ROLE,
    AppState,
};

const MAX_ROLE_NAME_LEN: usize = 64;

#[derive(Default)]
pub struct RoleResource;

/// Role names end up as CSV fields in the policy file.
fn validate_name(name: &str) -> ApiResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_ROLE_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "Role names use letters, digits, '_' and '-' only".into(),
        ))
    }
}

fn grants(permissions: &[Permission]) -> ApiResult<Vec<(String, String)>> {
    if permissions.is_empty() {
        return Err(ApiError::Validation("A role needs at least one permission".into()));
    }
    Ok(permissions.iter().map(|p| p.as_grant()).collect())
}

fn protect_admin(name: &str) -> ApiResult<()> {
    if name == ADMIN_ROLE {
        return Err(ApiError::Validation(format!("The {ADMIN_ROLE} role cannot be changed")));
    }
    Ok(())
}

async fn roles(state: &AppState, ctx: &DomainContext) -> ApiResult<Vec<Role>> {
    let stored = state.policy.role_permissions(&ctx.domain.to_string()).await?;
    Ok(stored
        .into_iter()
        .map(|(name, grants)| Role {
            name,
            permissions: grants
                .iter()
                .filter_map(|(object, action)| Permission::parse(object, action))
                .collect(),
        })
        .collect())
}

async fn find_role(state: &AppState, ctx: &DomainContext, name: &str) -> ApiResult<Role> {
    roles(state, ctx)
        .await?
        .into_iter()
        .find(|r| r.name == name)
        .ok_or_else(|| ApiError::NotFound("Role not found".into()))
}

#[async_trait]
impl ResourceHandler for RoleResource {
    const KIND: ResourceKind = ResourceKind::Role;
    type Id = String;

    async fn list(&self, state: &AppState, ctx: &DomainContext) -> ApiResult<Value> {
        Ok(json!(roles(state, ctx).await?))
    }

    async fn create(&self, state: &AppState, ctx: &DomainContext, body: Value) -> ApiResult<Value> {
        let req: CreateRoleRequest =
            serde_json::from_value(body).map_err(|e| ApiError::Validation(e.to_string()))?;
        let name = req.name.trim();
        validate_name(name)?;
        let grants = grants(&req.permissions)?;

        let domain = ctx.domain.to_string();
        if state.policy.role_permissions(&domain).await?.contains_key(name) {
            return Err(ApiError::Validation("Role already exists".into()));
        }
        state.policy.set_role_permissions(name, &domain, &grants).await?;

        tracing::info!(event = "role_created", domain = %ctx.domain, role = name, user_id = ctx.user().id);
        Ok(json!(find_role(state, ctx, name).await?))
    }

    async fn read(&self, state: &AppState, ctx: &DomainContext, name: String) -> ApiResult<Value> {
        Ok(json!(find_role(state, ctx, &name).await?))
    }

    /// Replace the role's permissions.
    async fn update(&self, state: &AppState, ctx: &DomainContext, name: String, body: Value) -> ApiResult<Value> {
        let req: UpdateRoleRequest =
            serde_json::from_value(body).map_err(|e| ApiError::Validation(e.to_string()))?;
        find_role(state, ctx, &name).await?;
        protect_admin(&name)?;
        let grants = grants(&req.permissions)?;

        state
            .policy
            .set_role_permissions(&name, &ctx.domain.to_string(), &grants)
            .await?;

        tracing::info!(event = "role_updated", domain = %ctx.domain, role = %name, user_id = ctx.user().id);
        Ok(json!(find_role(state, ctx, &name).await?))
    }

    /// Refused while anyone in the domain still holds the role.
    async fn delete(&self, state: &AppState, ctx: &DomainContext, name: String) -> ApiResult<Value> {
        find_role(state, ctx, &name).await?;
        protect_admin(&name)?;
        let domain = ctx.domain.to_string();

        let holders = state.policy.role_holders(&name, &domain).await?;
        if !holders.is_empty() {
            return Err(ApiError::Validation(format!(
                "Role {name} is still held by {} member(s)",
                holders.len()
            )));
        }
        state.policy.delete_role(&name, &domain).await?;

        tracing::info!(event = "role_deleted", domain = %ctx.domain, role = %name, user_id = ctx.user().id);
        Ok(json!({ "name": name }))
    }
}
