//! External identity providers and principal materialization for social login.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::models::user::{NewUser, User};
use crate::services::credentials::CredentialStore;

/// A verified identity returned by a provider after a code exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct SocialProfile {
    pub provider: String,
    pub provider_id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub verified: bool,
}

/// Exchanges an authorization code for a verified profile. The OAuth
/// exchange itself lives entirely behind this trait.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn exchange(&self, code: &str) -> StoreResult<SocialProfile>;
}

/// Registered providers, keyed by `IdentityProvider::name`.
#[derive(Clone, Default)]
pub struct IdentityProviders {
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
}

impl IdentityProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn IdentityProvider>> {
        self.providers.get(name)
    }
}

/// Resolve a provider profile into a stored principal.
///
/// 1. Known (provider, provider_id): refresh name, email, avatar, verified.
/// 2. Known email: link the provider to that account.
/// 3. Otherwise create a password-less user.
pub async fn find_or_create_user(
    credentials: &dyn CredentialStore,
    profile: &SocialProfile,
) -> StoreResult<User> {
    let email = profile.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(StoreError::Other(format!(
            "{} profile carries no email",
            profile.provider
        )));
    }

    if let Some(mut user) = credentials
        .find_by_provider(&profile.provider, &profile.provider_id)
        .await?
    {
        user.name = profile.name.clone();
        user.email = email;
        user.avatar = profile.avatar.clone();
        user.is_verified = profile.verified;
        credentials.update_user(&user).await?;
        return Ok(user);
    }

    if let Some(mut user) = credentials.find_by_email(&email).await? {
        user.provider = Some(profile.provider.clone());
        user.provider_id = Some(profile.provider_id.clone());
        user.avatar = profile.avatar.clone();
        user.is_verified = profile.verified;
        credentials.update_user(&user).await?;
        tracing::info!(
            event = "social_account_linked",
            provider = %profile.provider,
            user_id = user.id,
            "linked social login to existing user"
        );
        return Ok(user);
    }

    let user = credentials
        .create_user(NewUser {
            name: profile.name.clone(),
            email,
            password_hash: String::new(),
            avatar: profile.avatar.clone(),
            provider: Some(profile.provider.clone()),
            provider_id: Some(profile.provider_id.clone()),
            is_verified: profile.verified,
        })
        .await?;

    tracing::info!(
        event = "social_user_created",
        provider = %profile.provider,
        email = %user.email,
        user_id = user.id,
        "new user created via social login"
    );
    Ok(user)
}
