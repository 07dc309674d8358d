use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::models::Identity;

const AUTH_COOKIE: &str = "auth_token";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("No token provided")]
    MissingCredential,
    #[error("Malformed token: {0}")]
    MalformedCredential(String),
    #[error("Invalid token: {0}")]
    InvalidCredential(String),
    #[error("Token validation is not configured")]
    NotConfigured,
}

/// Get the credential presented by a client.
///
/// Looked up in order: explicit `token` query parameter, `Authorization`
/// header (with or without the `Bearer ` prefix), `auth_token` cookie.
pub fn extract_credential(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    // 1. Handshake parameter
    if let Some(token) = query_token.map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }

    // 2. Authorization header
    if let Some(auth_header) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        let token = auth_header.strip_prefix("Bearer ").unwrap_or(auth_header).trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    // 3. Cookie
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie::Cookie::split_parse(cookie_header)
        .flatten()
        .find(|c| c.name() == AUTH_COOKIE)
        .map(|c| c.value().to_string())
}

/// Validates HS256 JWTs signed with the shared secret and turns their claims
/// into an [`Identity`]. Without a secret every credential is rejected.
#[derive(Clone)]
pub struct Authenticator {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl Authenticator {
    pub fn new(secret: Option<&str>) -> Self {
        Self {
            key: secret.filter(|s| !s.is_empty()).map(|s| DecodingKey::from_secret(s.as_bytes())),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn authenticate(&self, credential: Option<&str>) -> Result<Identity, AuthError> {
        let token = credential
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingCredential)?;
        let key = self.key.as_ref().ok_or(AuthError::NotConfigured)?;

        let token_data = decode::<Value>(token, key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                AuthError::MalformedCredential(e.to_string())
            }
            _ => AuthError::InvalidCredential(e.to_string()),
        })?;

        let identity = identity_from_claims(&token_data.claims)?;
        debug!("Token validated for {}", identity.id);
        Ok(identity)
    }
}

fn identity_from_claims(claims: &Value) -> Result<Identity, AuthError> {
    let claim = |name: &str| {
        claims
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let id = claim("userId")
        .or_else(|| claim("sub"))
        .ok_or_else(|| AuthError::MalformedCredential("token carries no user id".to_string()))?;
    let display_label = claim("email").or_else(|| claim("name")).unwrap_or_else(|| id.clone());
    let roles = match claims.get("roles").and_then(|v| v.as_array()) {
        Some(roles) => roles.iter().filter_map(|r| r.as_str().map(|s| s.to_string())).collect(),
        None => Vec::new(),
    };

    Ok(Identity { id, display_label, roles })
}
