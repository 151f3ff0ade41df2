use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        auth::DomainContext,
        policy::ResourceKind,
        user::{AddMemberRequest, UpdateProfileRequest, User, UserProfile},
    },
    routes::resources::ResourceHandler,
    AppState,
};

/// Users as seen from one domain: its active members.
#[derive(Default)]
pub struct UserResource;

// Users outside the current domain are indistinguishable from missing ones.
async fn find_member(state: &AppState, ctx: &DomainContext, id: Uuid) -> ApiResult<User> {
    state
        .credentials
        .find_by_uuid(id)
        .await?
        .filter(|u| u.domains.iter().any(|d| d.uuid == ctx.domain))
        .ok_or_else(|| ApiError::NotFound("User not found".into()))
}

#[async_trait]
impl ResourceHandler for UserResource {
    const KIND: ResourceKind = ResourceKind::User;
    type Id = Uuid;

    async fn list(&self, state: &AppState, ctx: &DomainContext) -> ApiResult<Value> {
        let members = state.credentials.list_domain_members(ctx.domain).await?;
        let profiles: Vec<UserProfile> = members.into_iter().map(UserProfile::from).collect();
        Ok(json!(profiles))
    }

    /// Add an existing user to the current domain.
    async fn create(&self, state: &AppState, ctx: &DomainContext, body: Value) -> ApiResult<Value> {
        let req: AddMemberRequest =
            serde_json::from_value(body).map_err(|e| ApiError::Validation(e.to_string()))?;

        let user = state.auth.add_member(ctx.domain, &req.email, &req.role).await?;
        Ok(json!(UserProfile::from(user)))
    }

    async fn read(&self, state: &AppState, ctx: &DomainContext, id: Uuid) -> ApiResult<Value> {
        let user = find_member(state, ctx, id).await?;
        Ok(json!(UserProfile::from(user)))
    }

    /// Change a member's profile. Roles change by adding the member again.
    async fn update(&self, state: &AppState, ctx: &DomainContext, id: Uuid, body: Value) -> ApiResult<Value> {
        let req: UpdateProfileRequest =
            serde_json::from_value(body).map_err(|e| ApiError::Validation(e.to_string()))?;
        let mut user = find_member(state, ctx, id).await?;

        if let Some(name) = req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ApiError::Validation("Name is required".into()));
            }
            user.name = name.to_string();
        }
        if let Some(avatar) = req.avatar {
            user.avatar = Some(avatar).filter(|a| !a.is_empty());
        }
        state.credentials.update_user(&user).await?;

        tracing::info!(event = "member_updated", domain = %ctx.domain, user_id = user.id, by = ctx.user().id);
        Ok(json!(UserProfile::from(user)))
    }

    /// Remove a member from the current domain; the account itself stays.
    async fn delete(&self, state: &AppState, ctx: &DomainContext, id: Uuid) -> ApiResult<Value> {
        state.auth.remove_member(ctx.domain, ctx.user(), id).await?;
        Ok(json!({ "uuid": id }))
    }
}
