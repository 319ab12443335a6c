// SPDX-License-Identifier: MIT

//! Backfill request generation for the Garmin wellness API.
//!
//! Historical data is requested in fixed-size windows because the vendor
//! caps the range of a single backfill call. Callers must also respect the
//! per-route maximum backfill period before asking for requests.

use crate::error::AppError;
use crate::models::GarminUser;
use crate::services::garmin::UserRepository;
use crate::services::signature::{
    generate_nonce, oauth_header, SignRequestParams, OAUTH_CONSUMER_KEY, OAUTH_NONCE,
    OAUTH_TIMESTAMP, OAUTH_VERSION, OAUTH_VERSION_VALUE,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const GARMIN_BACKFILL_BASE_URL: &str =
    "https://healthapi.garmin.com/wellness-api/rest/backfill";
const ROUTE_METHOD: &str = "GET";

/// One window of a backfill sweep: a signed vendor request plus the range
/// it covers.
#[derive(Debug)]
pub struct RestRequest {
    pub request: reqwest::Request,
    pub user: Arc<GarminUser>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A Garmin wellness backfill route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillRoute {
    Dailies,
    Activities,
    Epochs,
    Sleeps,
    BodyComps,
    StressDetails,
}

impl BackfillRoute {
    pub fn sub_path(&self) -> &'static str {
        match self {
            BackfillRoute::Dailies => "dailies",
            BackfillRoute::Activities => "activities",
            BackfillRoute::Epochs => "epochs",
            BackfillRoute::Sleeps => "sleeps",
            BackfillRoute::BodyComps => "bodyComps",
            BackfillRoute::StressDetails => "stressDetails",
        }
    }

    /// Vendor cap on the range of a single request.
    pub fn max_days_per_request(&self) -> i64 {
        5
    }

    /// Vendor cap on the total backfill period. The activity route allows
    /// five years, everything else two.
    pub fn max_backfill_period(&self) -> Duration {
        match self {
            BackfillRoute::Activities => Duration::days(365 * 5),
            _ => Duration::days(365 * 2),
        }
    }

    fn url(&self) -> String {
        format!("{}/{}", GARMIN_BACKFILL_BASE_URL, self.sub_path())
    }
}

/// Builds windowed, signed backfill requests through a user repository.
pub struct BackfillRequestGenerator {
    http: reqwest::Client,
    repository: Arc<dyn UserRepository>,
    consumer_key: String,
}

impl BackfillRequestGenerator {
    pub fn new(repository: Arc<dyn UserRepository>, consumer_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            repository,
            consumer_key,
        }
    }

    /// Produce signed requests covering `[start, end)` in window order,
    /// stopping once `end` is covered or `max` requests were produced.
    /// The final window is clamped to `end`.
    pub async fn generate_requests(
        &self,
        route: BackfillRoute,
        user: Arc<GarminUser>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max: usize,
    ) -> Result<Vec<RestRequest>, AppError> {
        let window = Duration::days(route.max_days_per_request());
        let mut range_start = start;
        let mut requests = Vec::new();

        while range_start < end && requests.len() < max {
            let range_end = (range_start + window).min(end);
            let request = self
                .create_request(route, &user, range_start, range_end)
                .await?;
            requests.push(RestRequest {
                request,
                user: user.clone(),
                start: range_start,
                end: range_end,
            });
            range_start = range_end;
        }

        Ok(requests)
    }

    /// Build one signed GET for a window.
    async fn create_request(
        &self,
        route: BackfillRoute,
        user: &GarminUser,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<reqwest::Request, AppError> {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "summaryStartTimeInSeconds".to_string(),
            start.timestamp().to_string(),
        );
        parameters.insert(
            "summaryEndTimeInSeconds".to_string(),
            end.timestamp().to_string(),
        );
        parameters.insert(OAUTH_CONSUMER_KEY.to_string(), self.consumer_key.clone());
        parameters.insert(OAUTH_NONCE.to_string(), generate_nonce());
        parameters.insert(
            OAUTH_TIMESTAMP.to_string(),
            Utc::now().timestamp().to_string(),
        );
        parameters.insert(OAUTH_VERSION.to_string(), OAUTH_VERSION_VALUE.to_string());

        let payload = SignRequestParams::new(route.url(), ROUTE_METHOD, parameters);
        let signed = self.repository.signed_request(user, &payload).await?;

        // Window bounds travel as query parameters; the OAuth parameters
        // (signature included) travel in the authorization header.
        let query: Vec<(&String, &String)> = signed
            .parameters
            .iter()
            .filter(|(key, _)| !key.starts_with("oauth_"))
            .collect();
        let oauth: BTreeMap<String, String> = signed
            .parameters
            .iter()
            .filter(|(key, _)| key.starts_with("oauth_"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        self.http
            .get(&signed.url)
            .query(&query)
            .header(reqwest::header::AUTHORIZATION, oauth_header(&oauth))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build request: {}", e)))
    }
}
