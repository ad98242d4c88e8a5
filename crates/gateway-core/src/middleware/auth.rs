//! Bearer token verification: local (shared-secret JWT) and remote (identity
//! service) modes.
//!
//! Only the `Bearer <token>` shape is accepted. Local mode decodes the token
//! with the configured secret and algorithm; remote mode delegates to the
//! identity service's validate endpoint. Both paths resolve to an
//! [`Identity`] attached to the request context by the pipeline.

use crate::models::settings::JwtSettings;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// The authenticated principal extracted from a verified token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == "admin")
    }
}

/// Standard JWT claim set this gateway expects from either verification mode.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
    #[allow(dead_code)]
    exp: usize,
}

/// Failure modes for token verification, mapped to HTTP status by
/// `GatewayError` at the pipeline boundary: the first four deny with 401,
/// `UpstreamUnavailable` denies with 503.
#[derive(Debug, Error, PartialEq)]
pub enum TokenError {
    #[error("missing Authorization header")]
    Missing,
    #[error("malformed Authorization header")]
    Malformed,
    #[error("token expired")]
    Expired,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token revoked")]
    Revoked,
    #[error("identity service unavailable")]
    UpstreamUnavailable,
}

#[derive(Debug, Deserialize)]
struct RemoteValidateResponse {
    user_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

pub struct TokenVerifier {
    jwt: JwtSettings,
    identity_service_url: Option<String>,
    http: reqwest::Client,
}

impl TokenVerifier {
    pub fn new(jwt: JwtSettings, identity_service_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .expect("reqwest client for identity service");
        Self {
            jwt,
            identity_service_url,
            http,
        }
    }

    /// Verifies an `Authorization` header value, preferring local
    /// verification and falling back to the identity service when configured.
    pub async fn verify(&self, authorization: Option<&str>) -> Result<Identity, TokenError> {
        let token = Self::extract_bearer(authorization)?;

        match self.verify_local(token) {
            Ok(identity) => Ok(identity),
            Err(TokenError::InvalidSignature) if self.identity_service_url.is_some() => {
                self.verify_remote(token).await
            }
            Err(e) => Err(e),
        }
    }

    fn extract_bearer(authorization: Option<&str>) -> Result<&str, TokenError> {
        let header = authorization.ok_or(TokenError::Missing)?;
        header
            .strip_prefix("Bearer ")
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::Malformed)
    }

    fn verify_local(&self, token: &str) -> Result<Identity, TokenError> {
        let algorithm = match self.jwt.algorithm.as_str() {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            _ => Algorithm::HS256,
        };

        let mut validation = Validation::new(algorithm);
        if let Some(aud) = &self.jwt.audience {
            validation.set_audience(&[aud]);
        }
        if let Some(iss) = &self.jwt.issuer {
            validation.set_issuer(&[iss]);
        }

        let key = DecodingKey::from_secret(self.jwt.secret.as_bytes());
        let data = decode::<Claims>(token, &key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::InvalidSignature,
            }
        })?;

        Ok(Identity {
            user_id: data.claims.sub,
            email: data.claims.email,
            roles: data.claims.roles,
        })
    }

    async fn verify_remote(&self, token: &str) -> Result<Identity, TokenError> {
        let url = self
            .identity_service_url
            .as_deref()
            .ok_or(TokenError::UpstreamUnavailable)?;

        let response = self
            .http
            .post(format!("{}/validate", url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|_| TokenError::UpstreamUnavailable)?;

        match response.status().as_u16() {
            200 => {
                let body: RemoteValidateResponse = response
                    .json()
                    .await
                    .map_err(|_| TokenError::UpstreamUnavailable)?;
                Ok(Identity {
                    user_id: body.user_id,
                    email: body.email,
                    roles: body.roles,
                })
            }
            401 => Err(TokenError::InvalidSignature),
            403 => Err(TokenError::Revoked),
            _ => Err(TokenError::UpstreamUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(
            JwtSettings {
                secret: "a-sufficiently-long-test-secret-value".to_string(),
                algorithm: "HS256".to_string(),
                issuer: None,
                audience: None,
            },
            None,
        )
    }

    #[test]
    fn missing_header_is_missing_error() {
        assert_eq!(
            TokenVerifier::extract_bearer(None).unwrap_err(),
            TokenError::Missing
        );
    }

    #[test]
    fn non_bearer_header_is_malformed() {
        assert_eq!(
            TokenVerifier::extract_bearer(Some("Basic abc")).unwrap_err(),
            TokenError::Malformed
        );
    }

    #[tokio::test]
    async fn garbage_token_is_invalid_signature() {
        let v = verifier();
        let result = v.verify(Some("Bearer not-a-real-jwt")).await;
        assert_eq!(result.unwrap_err(), TokenError::InvalidSignature);
    }
}
