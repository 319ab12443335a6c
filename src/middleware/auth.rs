// SPDX-License-Identifier: MIT

//! Bearer JWT authentication against the management portal.
//!
//! The portal publishes its token-signing public key at
//! `/oauth/token_key`; the key is fetched once at startup and held for the
//! process lifetime.

use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const TOKEN_KEY_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Scope required to relay measurement data through the gateway.
pub const MEASUREMENT_CREATE: &str = "MEASUREMENT.CREATE";

/// JWT claims issued by the management portal.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    scope: Option<Scopes>,
}

/// The portal has issued scopes both as a list and space-separated.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scopes {
    List(Vec<String>),
    Spaced(String),
}

impl Scopes {
    fn into_vec(self) -> Vec<String> {
        match self {
            Scopes::List(scopes) => scopes,
            Scopes::Spaced(scopes) => scopes.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// Authenticated principal extracted from a verified token.
#[derive(Debug, Clone)]
pub struct AuthClaims {
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub scopes: Vec<String>,
}

impl AuthClaims {
    pub fn has_permission(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Verify that the token may write data for the given project/user.
    pub fn check_permission(
        &self,
        project_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<(), StatusCode> {
        if !self.has_permission(MEASUREMENT_CREATE) {
            return Err(StatusCode::FORBIDDEN);
        }
        if let (Some(expected), Some(actual)) = (self.user_id.as_deref(), user_id) {
            if expected != actual {
                return Err(StatusCode::FORBIDDEN);
            }
        }
        if let (Some(expected), Some(actual)) = (self.project_id.as_deref(), project_id) {
            if expected != actual {
                return Err(StatusCode::FORBIDDEN);
            }
        }
        Ok(())
    }
}

/// Token key document published by the management portal.
#[derive(Debug, Deserialize)]
struct TokenKeyResponse {
    #[allow(dead_code)]
    alg: Option<String>,
    value: String,
}

/// Verifies bearer tokens with the portal's public key.
pub struct TokenVerifier {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl TokenVerifier {
    /// Fetch the public key from the management portal.
    pub async fn from_management_portal(
        token_key_url: &str,
        resource_name: &str,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(TOKEN_KEY_FETCH_TIMEOUT)
            .build()?;
        let response: TokenKeyResponse = http
            .get(token_key_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        tracing::info!(url = token_key_url, "Fetched management portal token key");
        Self::from_public_key_pem(response.value.as_bytes(), resource_name)
    }

    /// Build a verifier from a PEM public key directly (static config).
    pub fn from_public_key_pem(pem: &[u8], resource_name: &str) -> anyhow::Result<Self> {
        let key = DecodingKey::from_rsa_pem(pem)?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[resource_name]);
        Ok(Self {
            key: Some(key),
            validation,
        })
    }

    /// Create a verifier without a key for testing (offline mode).
    ///
    /// Every token is rejected.
    pub fn new_mock() -> Self {
        Self {
            key: None,
            validation: Validation::new(Algorithm::RS256),
        }
    }

    /// Verify a bearer token and extract its claims.
    pub fn verify(&self, token: &str) -> Result<AuthClaims, StatusCode> {
        let key = self.key.as_ref().ok_or(StatusCode::UNAUTHORIZED)?;
        let data =
            decode::<Claims>(token, key, &self.validation).map_err(|_| StatusCode::UNAUTHORIZED)?;

        Ok(AuthClaims {
            user_id: data.claims.sub.filter(|sub| !sub.is_empty()),
            project_id: data.claims.project,
            scopes: data
                .claims
                .scope
                .map(Scopes::into_vec)
                .unwrap_or_default(),
        })
    }
}

/// Middleware that requires a valid management portal bearer token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(h) if h.starts_with("Bearer ") => &h[7..],
        _ => return Err(StatusCode::UNAUTHORIZED),
    };

    let claims = state.token_verifier.verify(token)?;
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}
