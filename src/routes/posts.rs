use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{auth::DomainContext, policy::ResourceKind, post::PostRequest},
    routes::resources::ResourceHandler,
    AppState,
};

const MAX_TITLE_LEN: usize = 200;

#[derive(Default)]
pub struct PostResource;

fn post_request(body: Value) -> ApiResult<PostRequest> {
    let mut req: PostRequest =
        serde_json::from_value(body).map_err(|e| ApiError::Validation(e.to_string()))?;
    req.title = req.title.trim().to_string();
    if req.title.is_empty() {
        return Err(ApiError::Validation("Title is required".into()));
    }
    if req.title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::Validation(format!(
            "Title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(req)
}

fn not_found() -> ApiError {
    ApiError::NotFound("Post not found".into())
}

#[async_trait]
impl ResourceHandler for PostResource {
    const KIND: ResourceKind = ResourceKind::Post;
    type Id = Uuid;

    async fn list(&self, state: &AppState, ctx: &DomainContext) -> ApiResult<Value> {
        Ok(json!(state.posts.list(ctx.domain).await?))
    }

    async fn create(&self, state: &AppState, ctx: &DomainContext, body: Value) -> ApiResult<Value> {
        let req = post_request(body)?;
        let post = state
            .posts
            .create(ctx.domain, ctx.user(), &req)
            .await?
            .ok_or_else(|| ApiError::NotFound("Domain not found".into()))?;

        tracing::info!(event = "post_created", domain = %ctx.domain, user_id = ctx.user().id, post = %post.uuid);
        Ok(json!(post))
    }

    async fn read(&self, state: &AppState, ctx: &DomainContext, id: Uuid) -> ApiResult<Value> {
        let post = state.posts.find(ctx.domain, id).await?.ok_or_else(not_found)?;
        Ok(json!(post))
    }

    async fn update(&self, state: &AppState, ctx: &DomainContext, id: Uuid, body: Value) -> ApiResult<Value> {
        let req = post_request(body)?;
        let post = state
            .posts
            .update(ctx.domain, id, &req)
            .await?
            .ok_or_else(not_found)?;
        Ok(json!(post))
    }

    async fn delete(&self, state: &AppState, ctx: &DomainContext, id: Uuid) -> ApiResult<Value> {
        if !state.posts.delete(ctx.domain, id).await? {
            return Err(not_found());
        }
        tracing::info!(event = "post_deleted", domain = %ctx.domain, user_id = ctx.user().id, post = %id);
        Ok(json!({ "uuid": id }))
    }
}
