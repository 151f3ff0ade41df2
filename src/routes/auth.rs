use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::ApiResult,
    models::{
        auth::{AuthContext, LoginRequest, LoginResponse, RefreshRequest, SocialCallbackQuery},
        domain::{CreateDomainRequest, Domain},
        user::{RegisterRequest, UserProfile},
    },
    AppState,
};

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let pair = state.auth.login(&body.email, &body.password).await?;
    Ok(Json(pair.into()))
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let user = state.auth.register(body).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let pair = state.auth.refresh(&body.token).await?;
    Ok(Json(pair.into()))
}

pub async fn logout(State(state): State<AppState>, auth: AuthContext) -> ApiResult<Json<Value>> {
    state.auth.logout(auth.user.id).await?;
    Ok(Json(json!({ "message": "Logged out" })))
}

pub async fn me(auth: AuthContext) -> Json<UserProfile> {
    Json(auth.user.into())
}

pub async fn social_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<SocialCallbackQuery>,
) -> ApiResult<Json<LoginResponse>> {
    let pair = state.auth.social_login(&provider, &query.code).await?;
    Ok(Json(pair.into()))
}

/// Any authenticated user may open a domain; they become its Admin.
pub async fn create_domain(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<CreateDomainRequest>,
) -> ApiResult<(StatusCode, Json<Domain>)> {
    let domain = state.auth.create_domain(&auth.user, &body.name).await?;
    Ok((StatusCode::CREATED, Json(domain)))
}
