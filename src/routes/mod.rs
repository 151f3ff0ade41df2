pub mod auth;
pub mod domains;
pub mod health;
pub mod posts;
pub mod resources;
pub mod roles;
pub mod users;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;
use domains::DomainResource;
use posts::PostResource;
use resources::resource_routes;
use roles::RoleResource;
use users::UserResource;

/// All routes with state applied; transport layers are added by the caller.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Auth
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/refresh", post(auth::refresh_token))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/auth/{provider}/callback", get(auth::social_callback))
        .route("/domains", post(auth::create_domain))
        // Domain-scoped resources
        .merge(resource_routes::<UserResource>("/api/users"))
        .merge(resource_routes::<PostResource>("/api/posts"))
        .merge(resource_routes::<RoleResource>("/api/roles"))
        .merge(resource_routes::<DomainResource>("/api/domains"))
        .with_state(state)
}
