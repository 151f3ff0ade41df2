use std::sync::Arc;

use crate::services::auth::AuthService;
use crate::services::credentials::CredentialStore;
use crate::services::policy::PolicyEngine;
use crate::services::posts::PostStore;
use crate::services::session::SessionManager;
use crate::services::session_cache::SessionCache;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub credentials: Arc<dyn CredentialStore>,
    pub policy: Arc<dyn PolicyEngine>,
    pub posts: Arc<dyn PostStore>,
    pub cache: Arc<dyn SessionCache>,
    pub auth: Arc<AuthService>,
}
