use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{auth::DomainContext, policy::ResourceKind},
    routes::resources::ResourceHandler,
    AppState,
};

#[derive(Default)]
pub struct DomainResource;

#[async_trait]
impl ResourceHandler for DomainResource {
    const KIND: ResourceKind = ResourceKind::Domain;
    type Id = Uuid;

    /// Domains the caller is an active member of.
    async fn list(&self, state: &AppState, ctx: &DomainContext) -> ApiResult<Value> {
        let domains = state.credentials.domains_for_user(ctx.user().id).await?;
        Ok(json!(domains))
    }

    /// Only the domain the request acts in is readable.
    async fn read(&self, state: &AppState, ctx: &DomainContext, id: Uuid) -> ApiResult<Value> {
        if id != ctx.domain {
            return Err(ApiError::NotFound("Domain not found".into()));
        }
        let domain = state
            .credentials
            .find_domain(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Domain not found".into()))?;
        Ok(json!(domain))
    }
}
