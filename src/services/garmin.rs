// SPDX-License-Identifier: MIT

//! Garmin Health API credential repository.
//!
//! Handles:
//! - Access token / token secret lookup through the directory snapshot
//! - OAuth1 request signing with the process consumer key pair
//! - User deregistration against the vendor revoke endpoint

use crate::error::AppError;
use crate::models::GarminUser;
use crate::services::directory::UserDirectory;
use crate::services::signature::{
    generate_nonce, oauth_header, OauthSignature, SignRequestParams, OAUTH_ACCESS_TOKEN,
    OAUTH_CONSUMER_KEY, OAUTH_NONCE, OAUTH_SIGNATURE, OAUTH_SIGNATURE_METHOD,
    OAUTH_SIGNATURE_METHOD_VALUE, OAUTH_TIMESTAMP, OAUTH_VERSION, OAUTH_VERSION_VALUE,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const GARMIN_DEREGISTER_ENDPOINT: &str =
    "https://healthapi.garmin.com/wellness-api/rest/user/registration";

/// Outcome classes for a vendor token-revocation response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// Vendor confirmed the revocation (200, 204).
    Revoked,
    /// Vendor rejected the call (400, 401, 403); the registration must be
    /// cleared out-of-band with vendor support.
    Rejected,
}

/// Classify a vendor revoke response code.
pub fn interpret_revoke_status(status: u16) -> Result<RevokeOutcome, AppError> {
    match status {
        200 | 204 => Ok(RevokeOutcome::Revoked),
        400 | 401 | 403 => Ok(RevokeOutcome::Rejected),
        code => Err(AppError::BadGateway(format!(
            "Cannot connect to {GARMIN_DEREGISTER_ENDPOINT}: HTTP status {code}"
        ))),
    }
}

/// Capability set of a user repository backing the push integration.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Look up a user by directory id.
    async fn get(&self, uuid: &str) -> Result<Option<Arc<GarminUser>>, AppError>;

    /// Enumerate all known users.
    async fn list(&self) -> Vec<Arc<GarminUser>>;

    /// The user's current OAuth1 access token.
    async fn access_token(&self, user: &GarminUser) -> Result<String, AppError>;

    /// The user's current OAuth1 token secret.
    async fn access_token_secret(&self, user: &GarminUser) -> Result<String, AppError>;

    /// Merge token, signature method and a fresh signature into `payload`.
    /// Returns a new parameter set; the input is not modified.
    async fn signed_request(
        &self,
        user: &GarminUser,
        payload: &SignRequestParams,
    ) -> Result<SignRequestParams, AppError>;

    /// Revoke the vendor registration for a service user id and, on vendor
    /// confirmation, delete the backing directory document.
    async fn deregister_user(
        &self,
        service_user_id: &str,
        user_access_token: &str,
    ) -> Result<(), AppError>;

    /// Whether the directory has changed since the last drain.
    fn has_pending_updates(&self) -> bool;

    /// Drain the pending-updates flag. Fails when nothing is pending.
    fn apply_pending_updates(&self) -> Result<(), AppError>;
}

/// Directory-backed repository signing with the process consumer key pair.
#[derive(Clone)]
pub struct GarminUserRepository {
    http: reqwest::Client,
    directory: Arc<UserDirectory>,
    consumer_key: String,
    consumer_secret: String,
    deregister_endpoint: String,
}

impl GarminUserRepository {
    pub fn new(
        directory: Arc<UserDirectory>,
        consumer_key: String,
        consumer_secret: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            directory,
            consumer_key,
            consumer_secret,
            deregister_endpoint: GARMIN_DEREGISTER_ENDPOINT.to_string(),
        }
    }

    /// Point the revoke call at a different endpoint (tests).
    pub fn with_deregister_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.deregister_endpoint = endpoint.into();
        self
    }

    /// Current credential record for a user, straight from the snapshot so
    /// rotated secrets take effect immediately.
    async fn current_record(&self, user: &GarminUser) -> Result<Arc<GarminUser>, AppError> {
        self.directory.get(user.id()).await?.ok_or_else(|| {
            AppError::Unauthorized(format!(
                "No credentials for user {} could be found.",
                user.id()
            ))
        })
    }

    /// Baseline OAuth parameters for a direct vendor call.
    fn auth_params(&self, access_token: &str, nonce: String, timestamp: i64) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert(OAUTH_CONSUMER_KEY.to_string(), self.consumer_key.clone());
        params.insert(OAUTH_NONCE.to_string(), nonce);
        params.insert(
            OAUTH_SIGNATURE_METHOD.to_string(),
            OAUTH_SIGNATURE_METHOD_VALUE.to_string(),
        );
        params.insert(OAUTH_TIMESTAMP.to_string(), timestamp.to_string());
        params.insert(OAUTH_ACCESS_TOKEN.to_string(), access_token.to_string());
        params.insert(OAUTH_VERSION.to_string(), OAUTH_VERSION_VALUE.to_string());
        params
    }

    /// Build a signed vendor request with the OAuth authorization header.
    fn build_signed_request(
        &self,
        method: reqwest::Method,
        url: &str,
        access_token: &str,
        token_secret: &str,
    ) -> Result<reqwest::Request, AppError> {
        let mut params = self.auth_params(
            access_token,
            generate_nonce(),
            chrono::Utc::now().timestamp(),
        );
        let signature = OauthSignature::new(
            url,
            method.as_str(),
            &params,
            &self.consumer_secret,
            Some(token_secret),
        )
        .encoded_signature();
        params.insert(OAUTH_SIGNATURE.to_string(), signature);

        self.http
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, oauth_header(&params))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))
    }

    /// Issue the signed DELETE against the vendor revoke endpoint.
    async fn revoke_token(
        &self,
        access_token: &str,
        token_secret: &str,
    ) -> Result<RevokeOutcome, AppError> {
        if access_token.is_empty() {
            return Err(AppError::BadRequest(
                "Token cannot be null or empty".to_string(),
            ));
        }

        let request = self.build_signed_request(
            reqwest::Method::DELETE,
            &self.deregister_endpoint,
            access_token,
            token_secret,
        )?;

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| AppError::BadGateway(format!("Garmin revoke call failed: {}", e)))?;

        let status = response.status().as_u16();
        if let Ok(RevokeOutcome::Rejected) = interpret_revoke_status(status) {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status, body = %body, "Error while revoking token");
            return Ok(RevokeOutcome::Rejected);
        }
        interpret_revoke_status(status)
    }
}

#[async_trait]
impl UserRepository for GarminUserRepository {
    async fn get(&self, uuid: &str) -> Result<Option<Arc<GarminUser>>, AppError> {
        self.directory.get(uuid).await
    }

    async fn list(&self) -> Vec<Arc<GarminUser>> {
        self.directory.users()
    }

    async fn access_token(&self, user: &GarminUser) -> Result<String, AppError> {
        let record = self.current_record(user).await?;
        record
            .access_token()
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::Unauthorized(format!(
                    "The access token for user {} could not be found.",
                    user.id()
                ))
            })
    }

    async fn access_token_secret(&self, user: &GarminUser) -> Result<String, AppError> {
        let record = self.current_record(user).await?;
        record
            .access_token_secret()
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::Unauthorized(format!(
                    "The access token secret for user {} could not be found.",
                    user.id()
                ))
            })
    }

    async fn signed_request(
        &self,
        user: &GarminUser,
        payload: &SignRequestParams,
    ) -> Result<SignRequestParams, AppError> {
        let access_token = self.access_token(user).await?;
        let token_secret = self.access_token_secret(user).await?;

        let mut parameters = payload.parameters.clone();
        parameters.insert(OAUTH_ACCESS_TOKEN.to_string(), access_token);
        parameters.insert(
            OAUTH_SIGNATURE_METHOD.to_string(),
            OAUTH_SIGNATURE_METHOD_VALUE.to_string(),
        );
        let signature = OauthSignature::new(
            &payload.url,
            &payload.method,
            &parameters,
            &self.consumer_secret,
            Some(&token_secret),
        )
        .encoded_signature();
        parameters.insert(OAUTH_SIGNATURE.to_string(), signature);

        Ok(SignRequestParams::new(
            payload.url.clone(),
            payload.method.clone(),
            parameters,
        ))
    }

    async fn deregister_user(
        &self,
        service_user_id: &str,
        user_access_token: &str,
    ) -> Result<(), AppError> {
        // A missing record or secret degrades to an empty secret so the
        // vendor revoke can still be attempted.
        let token_secret = match self.directory.find_by_external_id(service_user_id) {
            Some(user) => match self.access_token_secret(&user).await {
                Ok(secret) => secret,
                Err(e) if e.is_credential_error() => {
                    tracing::info!(
                        service_user_id,
                        "Access token secret not found, deregistering without it"
                    );
                    String::new()
                }
                Err(e) => return Err(e),
            },
            None => {
                tracing::info!(
                    service_user_id,
                    "User not found, deregistering without access token secret"
                );
                String::new()
            }
        };

        match self.revoke_token(user_access_token, &token_secret).await? {
            RevokeOutcome::Revoked => {
                tracing::info!(service_user_id, "Successfully deregistered user");
                // Only delete the backing document on confirmed revocation.
                match self.directory.document_id_by_external_id(service_user_id) {
                    Ok(uuid) => self.directory.delete_user(&uuid).await?,
                    Err(AppError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
                Ok(())
            }
            RevokeOutcome::Rejected => {
                tracing::error!(
                    service_user_id,
                    "Not able to deregister user. Contact Garmin support to remove \
                     the registration for this access token"
                );
                Ok(())
            }
        }
    }

    fn has_pending_updates(&self) -> bool {
        self.directory.has_pending_updates()
    }

    fn apply_pending_updates(&self) -> Result<(), AppError> {
        self.directory.apply_updates()
    }
}
