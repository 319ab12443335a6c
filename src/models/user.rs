// SPDX-License-Identifier: MIT

//! User directory records and their Firestore document shapes.
//!
//! A [`GarminUser`] is assembled from two backing documents: the auth-detail
//! document (Garmin collection) and the profile document (user collection).
//! Field names follow the live directory schema.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kafka record key identifying a project/user/source triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationKey {
    pub project_id: String,
    pub user_id: String,
    pub source_id: String,
}

/// Profile document stored in the user collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDetails {
    #[serde(rename = "project_id", default = "default_project_id")]
    pub project_id: String,
}

impl Default for UserDetails {
    fn default() -> Self {
        Self {
            project_id: default_project_id(),
        }
    }
}

fn default_project_id() -> String {
    "radar-firebase-default-project".to_string()
}

/// OAuth1 token material under the `resource_token` key of the auth-detail
/// document. Token lists are parallel: the first entry of each is current.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OauthCredentials {
    #[serde(default)]
    pub datetime: Option<i64>,
    #[serde(rename = "oauth_token", default)]
    pub oauth_tokens: Option<Vec<String>>,
    #[serde(rename = "oauth_token_secret", default)]
    pub oauth_token_secrets: Option<Vec<String>>,
}

/// Vendor-side identity and last sync error, under the `userId` key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

/// Auth-detail document stored in the Garmin collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarminAuthDetails {
    #[serde(rename = "source_id", default = "default_source_id")]
    pub source_id: String,
    #[serde(rename = "start_date", default)]
    pub start_date: Option<i64>,
    #[serde(rename = "end_date", default)]
    pub end_date: Option<i64>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(rename = "resource_token", default)]
    pub oauth_credentials: Option<OauthCredentials>,
    #[serde(rename = "userId", default)]
    pub user_info: Option<UserInfo>,
}

impl Default for GarminAuthDetails {
    fn default() -> Self {
        Self {
            source_id: default_source_id(),
            start_date: None,
            end_date: None,
            version: None,
            oauth_credentials: None,
            user_info: None,
        }
    }
}

fn default_source_id() -> String {
    "garmin".to_string()
}

/// A user admitted to the directory snapshot.
#[derive(Debug, Clone)]
pub struct GarminUser {
    pub uuid: String,
    pub user_details: UserDetails,
    pub auth_details: GarminAuthDetails,
}

impl GarminUser {
    pub fn id(&self) -> &str {
        &self.uuid
    }

    pub fn user_id(&self) -> &str {
        &self.uuid
    }

    pub fn project_id(&self) -> &str {
        &self.user_details.project_id
    }

    pub fn source_id(&self) -> &str {
        &self.auth_details.source_id
    }

    /// Vendor-side user id, empty when the directory has none yet.
    pub fn external_id(&self) -> &str {
        self.auth_details
            .user_info
            .as_ref()
            .and_then(|info| info.user_id.as_deref())
            .unwrap_or("")
    }

    pub fn service_user_id(&self) -> Result<&str, AppError> {
        self.auth_details
            .user_info
            .as_ref()
            .and_then(|info| info.user_id.as_deref())
            .ok_or_else(|| {
                AppError::IllegalState(format!("user {} has no service user id", self.uuid))
            })
    }

    pub fn start_date(&self) -> Result<DateTime<Utc>, AppError> {
        self.auth_details
            .start_date
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| {
                AppError::IllegalState(format!("user {} has no start date", self.uuid))
            })
    }

    pub fn end_date(&self) -> Result<DateTime<Utc>, AppError> {
        self.auth_details
            .end_date
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| AppError::IllegalState(format!("user {} has no end date", self.uuid)))
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.auth_details
            .oauth_credentials
            .as_ref()
            .and_then(|c| c.datetime)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    pub fn version(&self) -> Option<&str> {
        self.auth_details.version.as_deref()
    }

    pub fn is_authorized(&self) -> bool {
        self.access_token().is_some()
    }

    /// Current OAuth1 access token, if any.
    pub fn access_token(&self) -> Option<&str> {
        self.auth_details
            .oauth_credentials
            .as_ref()
            .and_then(|c| c.oauth_tokens.as_ref())
            .and_then(|tokens| tokens.first())
            .map(String::as_str)
    }

    /// Current OAuth1 token secret, if any.
    pub fn access_token_secret(&self) -> Option<&str> {
        self.auth_details
            .oauth_credentials
            .as_ref()
            .and_then(|c| c.oauth_token_secrets.as_ref())
            .and_then(|secrets| secrets.first())
            .map(String::as_str)
    }

    /// Derived record key. A pure function of the identity fields.
    pub fn observation_key(&self) -> ObservationKey {
        ObservationKey {
            project_id: self.project_id().to_string(),
            user_id: self.user_id().to_string(),
            source_id: self.source_id().to_string(),
        }
    }

    /// Derived versioned id: `{id}#{version}` when a version is set.
    pub fn versioned_id(&self) -> String {
        match self.version() {
            Some(version) => format!("{}#{}", self.uuid, version),
            None => self.uuid.clone(),
        }
    }

    /// Admission invariant for the directory snapshot.
    ///
    /// A record is admitted only with both authorization dates, a vendor
    /// user id, a non-empty token list, and no recorded sync error.
    pub fn is_valid(&self) -> bool {
        let has_token = self
            .auth_details
            .oauth_credentials
            .as_ref()
            .and_then(|c| c.oauth_tokens.as_ref())
            .is_some_and(|tokens| !tokens.is_empty());
        let has_external_id = self
            .auth_details
            .user_info
            .as_ref()
            .is_some_and(|info| info.user_id.is_some());
        let error_free = self
            .auth_details
            .user_info
            .as_ref()
            .and_then(|info| info.error_message.as_deref())
            .is_none_or(str::is_empty);

        self.auth_details.end_date.is_some()
            && self.auth_details.start_date.is_some()
            && has_external_id
            && has_token
            && error_free
    }
}
