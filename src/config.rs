use std::env;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;

use crate::services::session::SessionSettings;
use crate::services::token::TokenSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_access_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_algorithm: String,
    pub jwt_issuer: String,
    pub jwt_access_ttl_seconds: u64,
    /// Revisions disagreed between two hours and seven days; seven days is the default.
    pub jwt_refresh_ttl_seconds: u64,
    pub auto_logoff_seconds: u64,
    pub session_renew_timeout_seconds: u64,
    /// Policy CSV; created on first start. Role assignments are also rebuilt
    /// from stored memberships at startup.
    pub casbin_policy_path: String,
    pub host: String,
    pub port: u16,
    pub cors_origin: Option<String>,
    pub bcrypt_cost: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            jwt_access_secret: required("JWT_ACCESS_SECRET")?,
            jwt_refresh_secret: required("JWT_REFRESH_SECRET")?,
            jwt_algorithm: env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS512".into()),
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "domainauth".into()),
            jwt_access_ttl_seconds: parsed("JWT_ACCESS_TTL_SECONDS", 30 * 60)?,
            jwt_refresh_ttl_seconds: parsed("JWT_REFRESH_TTL_SECONDS", 7 * 24 * 60 * 60)?,
            auto_logoff_seconds: parsed("AUTO_LOGOFF_SECONDS", 10 * 60)?,
            session_renew_timeout_seconds: parsed("SESSION_RENEW_TIMEOUT_SECONDS", 5)?,
            casbin_policy_path: env::var("CASBIN_POLICY_PATH")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "casbin/policy.csv".into()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parsed("PORT", 8080)?,
            cors_origin: env::var("CORS_ORIGIN").ok().filter(|s| !s.is_empty()),
            bcrypt_cost: parsed("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
        })
    }

    pub fn token_settings(&self) -> anyhow::Result<TokenSettings> {
        let algorithm = Algorithm::from_str(&self.jwt_algorithm)
            .map_err(|_| anyhow::anyhow!("Unknown JWT_ALGORITHM: {}", self.jwt_algorithm))?;
        TokenSettings::new(
            self.jwt_access_secret.clone(),
            self.jwt_refresh_secret.clone(),
            algorithm,
            self.jwt_issuer.clone(),
            Duration::from_secs(self.jwt_access_ttl_seconds),
            Duration::from_secs(self.jwt_refresh_ttl_seconds),
        )
        .map_err(|e| anyhow::anyhow!("Invalid token settings: {e}"))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            auto_logoff: Duration::from_secs(self.auto_logoff_seconds),
            renew_timeout: Duration::from_secs(self.session_renew_timeout_seconds),
        }
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {key}: {e}")),
        _ => Ok(default),
    }
}
