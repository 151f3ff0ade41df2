//! Signed claim sets for access and refresh tokens.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;

use crate::error::AuthError;
use crate::models::auth::{SessionClaims, TokenKind};
use crate::models::domain::DomainRef;
use crate::models::user::User;

/// The only family `parse_token` accepts.
const HMAC_FAMILY: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
const HMAC_NAMES: [&str; 3] = ["HS256", "HS384", "HS512"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenSettingsError {
    #[error("{0:?} is not an HMAC algorithm")]
    NotHmac(Algorithm),

    #[error("token secrets must not be empty")]
    EmptySecret,

    #[error("access and refresh secrets must differ")]
    SharedSecret,
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    access_secret: String,
    refresh_secret: String,
    algorithm: Algorithm,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenSettings {
    pub fn new(
        access_secret: String,
        refresh_secret: String,
        algorithm: Algorithm,
        issuer: String,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self, TokenSettingsError> {
        if !HMAC_FAMILY.contains(&algorithm) {
            return Err(TokenSettingsError::NotHmac(algorithm));
        }
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(TokenSettingsError::EmptySecret);
        }
        if access_secret == refresh_secret {
            return Err(TokenSettingsError::SharedSecret);
        }
        Ok(Self {
            access_secret,
            refresh_secret,
            algorithm,
            issuer,
            access_ttl,
            refresh_ttl,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TokenCodec {
    settings: TokenSettings,
}

impl TokenCodec {
    pub fn new(settings: TokenSettings) -> Self {
        Self { settings }
    }

    pub fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => self.settings.access_secret.as_bytes(),
            TokenKind::Refresh => self.settings.refresh_secret.as_bytes(),
        }
    }

    /// Sign a claim set for `user` carrying `uid`. Returns the token and its
    /// absolute expiry in unix seconds.
    pub fn encode(
        &self,
        kind: TokenKind,
        user: &User,
        domains: &[DomainRef],
        uid: String,
    ) -> Result<(String, i64), AuthError> {
        let ttl = match kind {
            TokenKind::Access => self.settings.access_ttl,
            TokenKind::Refresh => self.settings.refresh_ttl,
        };
        let now = Utc::now().timestamp();
        let exp = now + ttl.as_secs() as i64;

        let claims = SessionClaims {
            uid,
            id: user.id,
            uuid: user.uuid,
            name: user.name.clone(),
            domains: domains.to_vec(),
            iss: self.settings.issuer.clone(),
            iat: now,
            exp,
        };

        let token = encode(
            &Header::new(self.settings.algorithm),
            &claims,
            &EncodingKey::from_secret(self.secret(kind)),
        )
        .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))?;

        Ok((token, exp))
    }

    /// Like `parse_token`, and the token must also come from this issuer.
    pub fn decode(&self, kind: TokenKind, token: &str) -> Result<SessionClaims, AuthError> {
        verify(token, self.secret(kind), Some(&self.settings.issuer))
    }
}

/// Verify `token` against `secret` and return its claims.
///
/// Any algorithm outside the HMAC family is rejected before the signature is
/// looked at. Expiry is enforced here; liveness is not.
pub fn parse_token(token: &str, secret: &[u8]) -> Result<SessionClaims, AuthError> {
    verify(token, secret, None)
}

/// `alg` as written in the token header. jsonwebtoken refuses to parse names
/// it has no variant for (`none` among them), so read the raw JSON.
fn declared_algorithm(token: &str) -> Option<String> {
    let header = token.split('.').next()?;
    let bytes = URL_SAFE_NO_PAD.decode(header.trim_end_matches('=')).ok()?;
    let header: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    header.get("alg")?.as_str().map(str::to_string)
}

fn verify(token: &str, secret: &[u8], issuer: Option<&str>) -> Result<SessionClaims, AuthError> {
    if let Some(alg) = declared_algorithm(token) {
        if !HMAC_NAMES.contains(&alg.as_str()) {
            return Err(AuthError::InvalidSigningMethod);
        }
    }

    let key = DecodingKey::from_secret(secret);
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = HMAC_FAMILY.to_vec();
    validation.validate_exp = true;
    validation.leeway = 0;
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }

    decode::<SessionClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                AuthError::InvalidSigningMethod
            }
            _ => AuthError::InvalidToken,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    // base64url({"typ":"JWT","alg":"RS256"})
    const RS256_HEADER: &str = "eyJ0eXAiOiJKV1QiLCJhbGciOiJSUzI1NiJ9";

    fn codec() -> TokenCodec {
        TokenCodec::new(
            TokenSettings::new(
                "access-secret".into(),
                "refresh-secret".into(),
                Algorithm::HS512,
                "domainauth".into(),
                Duration::from_secs(30 * 60),
                Duration::from_secs(7 * 24 * 60 * 60),
            )
            .unwrap(),
        )
    }

    fn user() -> User {
        User {
            id: 42,
            uuid: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password_hash: String::new(),
            avatar: None,
            provider: None,
            provider_id: None,
            is_verified: true,
            domains: vec![],
        }
    }

    #[test]
    fn claims_carry_principal_and_domain_snapshot() {
        let codec = codec();
        let user = user();
        let domains = vec![DomainRef { uuid: Uuid::new_v4(), name: "Acme".into() }];

        let (token, exp) = codec
            .encode(TokenKind::Access, &user, &domains, "uid-1".into())
            .unwrap();
        let claims = codec.decode(TokenKind::Access, &token).unwrap();

        assert_eq!(claims.uid, "uid-1");
        assert_eq!(claims.id, 42);
        assert_eq!(claims.uuid, user.uuid);
        assert_eq!(claims.domains, domains);
        assert_eq!(claims.exp, exp);
        assert_eq!(claims.iss, "domainauth");
        assert!(exp - claims.iat == 30 * 60);
    }

    #[test]
    fn access_token_does_not_verify_with_refresh_secret() {
        let codec = codec();
        let (token, _) = codec
            .encode(TokenKind::Access, &user(), &[], "uid".into())
            .unwrap();

        let err = codec.decode(TokenKind::Refresh, &token).unwrap_err();
        assert_eq!(err, AuthError::InvalidToken);
    }

    #[test]
    fn non_hmac_algorithm_is_rejected() {
        let codec = codec();
        let (token, _) = codec
            .encode(TokenKind::Access, &user(), &[], "uid".into())
            .unwrap();

        // Keep payload and signature, swap the header for an RS256 one.
        let mut parts = token.splitn(2, '.');
        let _header = parts.next().unwrap();
        let rest = parts.next().unwrap();
        let forged = format!("{RS256_HEADER}.{rest}");

        let err = parse_token(&forged, b"access-secret").unwrap_err();
        assert_eq!(err, AuthError::InvalidSigningMethod);
    }

    #[test]
    fn unsigned_none_token_is_rejected_as_signing_method() {
        let codec = codec();
        let (token, _) = codec
            .encode(TokenKind::Access, &user(), &[], "uid".into())
            .unwrap();

        let payload = token.split('.').nth(1).unwrap();
        let header = URL_SAFE_NO_PAD.encode(r#"{"typ":"JWT","alg":"none"}"#);
        let unsigned = format!("{header}.{payload}.");

        assert_eq!(
            parse_token(&unsigned, b"access-secret").unwrap_err(),
            AuthError::InvalidSigningMethod
        );
        assert_eq!(
            codec.decode(TokenKind::Access, &unsigned).unwrap_err(),
            AuthError::InvalidSigningMethod
        );
    }

    #[test]
    fn unknown_algorithm_name_is_rejected_as_signing_method() {
        let header = URL_SAFE_NO_PAD.encode(r#"{"typ":"JWT","alg":"XS999"}"#);
        let forged = format!("{header}.e30.c2ln");

        assert_eq!(
            parse_token(&forged, b"access-secret").unwrap_err(),
            AuthError::InvalidSigningMethod
        );
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let ours = codec();
        let theirs = TokenCodec::new(
            TokenSettings::new(
                "access-secret".into(),
                "refresh-secret".into(),
                Algorithm::HS512,
                "someone-else".into(),
                Duration::from_secs(30 * 60),
                Duration::from_secs(60 * 60),
            )
            .unwrap(),
        );
        let (token, _) = theirs
            .encode(TokenKind::Access, &user(), &[], "uid".into())
            .unwrap();

        assert_eq!(ours.decode(TokenKind::Access, &token).unwrap_err(), AuthError::InvalidToken);
        // The issuer-agnostic helper only checks signature and expiry.
        assert!(parse_token(&token, b"access-secret").is_ok());
    }

    #[test]
    fn expired_token_is_invalid() {
        let codec = codec();
        let user = user();
        let claims = SessionClaims {
            uid: "uid".into(),
            id: user.id,
            uuid: user.uuid,
            name: user.name.clone(),
            domains: vec![],
            iss: "domainauth".into(),
            iat: Utc::now().timestamp() - 120,
            exp: Utc::now().timestamp() - 60,
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(codec.secret(TokenKind::Access)),
        )
        .unwrap();

        let err = codec.decode(TokenKind::Access, &token).unwrap_err();
        assert_eq!(err, AuthError::InvalidToken);
    }

    #[test]
    fn garbage_is_invalid_token() {
        assert_eq!(
            parse_token("not.a.jwt", b"access-secret").unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[test]
    fn settings_refuse_asymmetric_algorithms_and_shared_secrets() {
        let ttl = Duration::from_secs(60);
        assert_eq!(
            TokenSettings::new("a".into(), "b".into(), Algorithm::RS256, "i".into(), ttl, ttl).unwrap_err(),
            TokenSettingsError::NotHmac(Algorithm::RS256)
        );
        assert_eq!(
            TokenSettings::new("a".into(), "a".into(), Algorithm::HS256, "i".into(), ttl, ttl).unwrap_err(),
            TokenSettingsError::SharedSecret
        );
        assert_eq!(
            TokenSettings::new("".into(), "b".into(), Algorithm::HS256, "i".into(), ttl, ttl).unwrap_err(),
            TokenSettingsError::EmptySecret
        );
    }
}
