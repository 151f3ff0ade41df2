//! Domain-scoped resources.
//!
//! A resource implements `ResourceHandler` for the actions it supports and
//! inherits `Unsupported` for the rest. `resource_routes` mounts all five
//! actions; every one of them passes the session, domain and resource gates
//! before the handler runs, so an unimplemented action still answers 403 to a
//! caller without the permission.

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        auth::DomainContext,
        policy::{Action, ResourceKind},
    },
    services::gate,
    AppState,
};

fn unsupported(resource: ResourceKind, action: Action) -> ApiError {
    ApiError::Unsupported(format!("{action} is not supported on {resource}"))
}

#[async_trait]
pub trait ResourceHandler: Default + Send + Sync + 'static {
    const KIND: ResourceKind;

    /// Path parameter naming one instance.
    type Id: DeserializeOwned + Send + 'static;

    async fn list(&self, _state: &AppState, _ctx: &DomainContext) -> ApiResult<Value> {
        Err(unsupported(Self::KIND, Action::List))
    }

    async fn create(&self, _state: &AppState, _ctx: &DomainContext, _body: Value) -> ApiResult<Value> {
        Err(unsupported(Self::KIND, Action::Create))
    }

    async fn read(&self, _state: &AppState, _ctx: &DomainContext, _id: Self::Id) -> ApiResult<Value> {
        Err(unsupported(Self::KIND, Action::Read))
    }

    async fn update(
        &self,
        _state: &AppState,
        _ctx: &DomainContext,
        _id: Self::Id,
        _body: Value,
    ) -> ApiResult<Value> {
        Err(unsupported(Self::KIND, Action::Update))
    }

    async fn delete(&self, _state: &AppState, _ctx: &DomainContext, _id: Self::Id) -> ApiResult<Value> {
        Err(unsupported(Self::KIND, Action::Delete))
    }
}

async fn permit<R: ResourceHandler>(state: &AppState, ctx: &DomainContext, action: Action) -> ApiResult<()> {
    gate::authorize_resource(state.policy.as_ref(), ctx, R::KIND, action).await?;
    Ok(())
}

async fn list<R: ResourceHandler>(
    State(state): State<AppState>,
    ctx: DomainContext,
) -> ApiResult<Json<Value>> {
    permit::<R>(&state, &ctx, Action::List).await?;
    Ok(Json(R::default().list(&state, &ctx).await?))
}

async fn create<R: ResourceHandler>(
    State(state): State<AppState>,
    ctx: DomainContext,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    permit::<R>(&state, &ctx, Action::Create).await?;
    let created = R::default().create(&state, &ctx, body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn read<R: ResourceHandler>(
    State(state): State<AppState>,
    ctx: DomainContext,
    Path(id): Path<R::Id>,
) -> ApiResult<Json<Value>> {
    permit::<R>(&state, &ctx, Action::Read).await?;
    Ok(Json(R::default().read(&state, &ctx, id).await?))
}

async fn update<R: ResourceHandler>(
    State(state): State<AppState>,
    ctx: DomainContext,
    Path(id): Path<R::Id>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    permit::<R>(&state, &ctx, Action::Update).await?;
    Ok(Json(R::default().update(&state, &ctx, id, body).await?))
}

async fn delete<R: ResourceHandler>(
    State(state): State<AppState>,
    ctx: DomainContext,
    Path(id): Path<R::Id>,
) -> ApiResult<Json<Value>> {
    permit::<R>(&state, &ctx, Action::Delete).await?;
    Ok(Json(R::default().delete(&state, &ctx, id).await?))
}

/// `path` serves List and Create, `path/{id}` serves Read, Update and Delete.
pub fn resource_routes<R: ResourceHandler>(path: &str) -> Router<AppState> {
    Router::new()
        .route(path, get(list::<R>).post(create::<R>))
        .route(
            &format!("{path}/{{id}}"),
            get(read::<R>).put(update::<R>).delete(delete::<R>),
        )
}
