#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use jsonwebtoken::Algorithm;
use serde_json::Value;
use tower::ServiceExt;

use domainauth::error::{StoreError, StoreResult};
use domainauth::services::auth::AuthService;
use domainauth::services::credentials::MemoryCredentialStore;
use domainauth::services::policy::CasbinPolicyEngine;
use domainauth::services::posts::MemoryPostStore;
use domainauth::services::session::{SessionManager, SessionSettings};
use domainauth::services::session_cache::MemorySessionCache;
use domainauth::services::social::{IdentityProvider, IdentityProviders, SocialProfile};
use domainauth::services::token::{TokenCodec, TokenSettings};
use domainauth::AppState;

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryCredentialStore>,
    pub cache: Arc<MemorySessionCache>,
    pub policy: Arc<CasbinPolicyEngine>,
}

/// Accepts only the code "valid".
pub struct StubProvider;

#[async_trait]
impl IdentityProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn exchange(&self, code: &str) -> StoreResult<SocialProfile> {
        if code != "valid" {
            return Err(StoreError::Other("code rejected".into()));
        }
        Ok(SocialProfile {
            provider: "stub".into(),
            provider_id: "42".into(),
            email: "social@example.com".into(),
            name: "Social User".into(),
            avatar: None,
            verified: true,
        })
    }
}

pub async fn test_app() -> TestApp {
    let store = Arc::new(MemoryCredentialStore::new());
    let cache = Arc::new(MemorySessionCache::new());
    let policy = Arc::new(CasbinPolicyEngine::in_memory().await.unwrap());

    let codec = TokenCodec::new(
        TokenSettings::new(
            "integration-access".into(),
            "integration-refresh".into(),
            Algorithm::HS512,
            "domainauth-test".into(),
            Duration::from_secs(30 * 60),
            Duration::from_secs(7 * 24 * 60 * 60),
        )
        .unwrap(),
    );
    let sessions = Arc::new(SessionManager::new(
        codec,
        cache.clone(),
        store.clone(),
        SessionSettings::default(),
    ));
    let auth = Arc::new(AuthService::new(
        sessions.clone(),
        store.clone(),
        policy.clone(),
        IdentityProviders::new().with(Arc::new(StubProvider)),
        4,
    ));

    let state = AppState {
        sessions,
        credentials: store.clone(),
        policy: policy.clone(),
        posts: Arc::new(MemoryPostStore::new()),
        cache: cache.clone(),
        auth,
    };

    TestApp {
        state,
        store,
        cache,
        policy,
    }
}

impl TestApp {
    pub fn router(&self) -> Router {
        domainauth::routes::router(self.state.clone())
    }

    /// Send one request; returns status and parsed JSON body (Null if empty).
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        domain: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(domain) = domain {
            req = req.header("X-Domain", domain);
        }
        let req = match body {
            Some(json) => req
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = self.router().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}
