//! Bearer token validation.
//!
//! Tokens are HMAC-signed JWTs issued by the identity service with a secret
//! shared with the gateway. The declared algorithm is checked by the gateway
//! itself, before any signature work, so a token announcing `none` or an
//! asymmetric algorithm never reaches the verifier.
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use http::{HeaderMap, HeaderName, header::AUTHORIZATION};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::models::AuthConfig;

/// Header carrying the authenticated subject to backend services.
pub static USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");

/// Authentication failures. All of them surface as 401.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingCredential,

    #[error("Invalid authorization header format")]
    MalformedCredential,

    #[error("Unsupported token algorithm")]
    UnsupportedAlgorithm,

    #[error("Invalid or expired token")]
    InvalidOrExpiredCredential,

    #[error("Invalid token claims")]
    InvalidClaims,
}

/// Subject decoded from a verified token. Lives in the request extensions for
/// the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub issued_at: Option<i64>,
    pub expires_at: i64,
}

#[derive(Deserialize)]
struct TokenHeader {
    alg: Option<String>,
}

/// Verifies bearer credentials against a single shared secret.
pub struct TokenValidator {
    decoding_key: DecodingKey,
    user_id_claim: String,
    leeway_secs: u64,
}

impl TokenValidator {
    pub fn new(secret: &str, user_id_claim: impl Into<String>, leeway_secs: u64) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            user_id_claim: user_id_claim.into(),
            leeway_secs,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.jwt_secret, &config.user_id_claim, config.leeway_secs)
    }

    /// Pull the token out of an `Authorization: Bearer <token>` header.
    pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
        let value = match headers.get(AUTHORIZATION) {
            None => return Err(AuthError::MissingCredential),
            Some(value) if value.is_empty() => return Err(AuthError::MissingCredential),
            Some(value) => value.to_str().map_err(|_| AuthError::MalformedCredential)?,
        };

        // Exactly one separating space, literal scheme.
        let mut parts = value.split(' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("Bearer"), Some(token), None) => Ok(token),
            _ => Err(AuthError::MalformedCredential),
        }
    }

    /// Validate the request's bearer credential and return its subject.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let token = Self::bearer_token(headers)?;
        self.validate(token)
    }

    /// Verify algorithm, signature and expiry, then extract the subject claim.
    pub fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        let algorithm = declared_algorithm(token)?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = self.leeway_secs;
        validation.validate_exp = true;
        validation.validate_aud = false;

        let data = decode::<Map<String, Value>>(token, &self.decoding_key, &validation).map_err(
            |e| {
                tracing::debug!(error = %e, "Bearer token rejected");
                AuthError::InvalidOrExpiredCredential
            },
        )?;
        let claims = data.claims;

        let user_id = claims
            .get(&self.user_id_claim)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or(AuthError::InvalidClaims)?;

        Ok(Identity {
            user_id: user_id.to_string(),
            issued_at: claims.get("iat").and_then(Value::as_i64),
            expires_at: claims.get("exp").and_then(Value::as_i64).unwrap_or_default(),
        })
    }
}

/// Read `alg` from the token header and accept only the HMAC family.
fn declared_algorithm(token: &str) -> Result<Algorithm, AuthError> {
    let segment = token
        .split('.')
        .next()
        .filter(|segment| !segment.is_empty())
        .ok_or(AuthError::InvalidOrExpiredCredential)?;
    let raw = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::InvalidOrExpiredCredential)?;
    let header: TokenHeader =
        serde_json::from_slice(&raw).map_err(|_| AuthError::InvalidOrExpiredCredential)?;

    match header.alg.as_deref() {
        Some("HS256") => Ok(Algorithm::HS256),
        Some("HS384") => Ok(Algorithm::HS384),
        Some("HS512") => Ok(Algorithm::HS512),
        other => {
            tracing::warn!(alg = ?other, "Rejected token with non-HMAC algorithm");
            Err(AuthError::UnsupportedAlgorithm)
        }
    }
}
