use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use redis::Client as RedisClient;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use domainauth::config::Config;
use domainauth::db;
use domainauth::db::setup::{run_setups, DefaultPolicies, Migrations};
use domainauth::routes;
use domainauth::services::auth::AuthService;
use domainauth::services::credentials::{CredentialStore, PgCredentialStore};
use domainauth::services::policy::{CasbinPolicyEngine, PolicyEngine};
use domainauth::services::posts::{PgPostStore, PostStore};
use domainauth::services::session::SessionManager;
use domainauth::services::session_cache::{RedisSessionCache, SessionCache};
use domainauth::services::social::IdentityProviders;
use domainauth::services::token::TokenCodec;
use domainauth::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let codec = TokenCodec::new(config.token_settings()?);

    let pool = db::create_pool(&config.database_url).await?;
    info!("Database connected");
    let credentials: Arc<dyn CredentialStore> = Arc::new(PgCredentialStore::new(pool.clone()));
    let posts: Arc<dyn PostStore> = Arc::new(PgPostStore::new(pool.clone()));

    let policy: Arc<dyn PolicyEngine> =
        Arc::new(CasbinPolicyEngine::from_file(&config.casbin_policy_path).await?);

    run_setups(&[
        &Migrations { pool },
        &DefaultPolicies {
            credentials: credentials.clone(),
            policy: policy.clone(),
        },
    ])
    .await?;

    let redis_client = RedisClient::open(config.redis_url.as_str())?;
    let redis_conn = redis_client.get_multiplexed_async_connection().await?;
    info!("Redis connected");
    let cache: Arc<dyn SessionCache> = Arc::new(RedisSessionCache::new(redis_conn));

    let sessions = Arc::new(SessionManager::new(
        codec,
        cache.clone(),
        credentials.clone(),
        config.session_settings(),
    ));

    // Concrete identity providers register here; none ship by default.
    let auth = Arc::new(AuthService::new(
        sessions.clone(),
        credentials.clone(),
        policy.clone(),
        IdentityProviders::new(),
        config.bcrypt_cost,
    ));

    let state = AppState {
        sessions,
        credentials,
        policy,
        posts,
        cache,
        auth,
    };

    let cors_origin = match &config.cors_origin {
        Some(origin) => AllowOrigin::exact(HeaderValue::from_str(origin)?),
        None => AllowOrigin::any(),
    };
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static("x-domain"),
        ]))
        .allow_origin(cors_origin);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    info!("domainauth API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
