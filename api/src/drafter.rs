use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

use cadence_core::clarification::ResolvedDates;
use cadence_core::dates::DateRange;
use cadence_core::intent::DrafterReply;
use cadence_core::plan::Plan;

use crate::error::AppError;

pub const DEFAULT_DRAFTER_TIMEOUT_MS: u64 = 8_000;

/// Client for the external intent-drafting model.
///
/// The drafter is glue, not engine: it turns free text plus context into a
/// structured intent which the pipeline re-validates from scratch. The call
/// is bounded; hitting the deadline is its own failure code, never conflated
/// with a validation error. Request state is left unchanged either way, so
/// the caller may retry the identical request.
#[derive(Clone)]
pub struct DrafterClient {
    http: reqwest::Client,
    base_url: String,
}

/// Everything the drafter gets to work with. Dates and ranges the engine
/// could already pin down deterministically arrive pre-resolved; the drafter
/// never does date arithmetic of its own.
#[derive(Debug, Serialize)]
pub struct DraftContext<'a> {
    pub message: &'a str,
    pub today: NaiveDate,
    pub resolved_dates: &'a ResolvedDates,
    pub resolved_ranges: &'a BTreeMap<String, DateRange>,
    pub plan: &'a Plan,
    pub history: &'a [String],
}

impl DrafterClient {
    pub fn from_env() -> Self {
        let base_url = std::env::var("CADENCE_DRAFTER_URL")
            .unwrap_or_else(|_| "http://localhost:8090".to_string());
        let timeout_ms: u64 = std::env::var("CADENCE_DRAFTER_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_DRAFTER_TIMEOUT_MS);
        Self::new(base_url, Duration::from_millis(timeout_ms))
    }

    pub fn new(base_url: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build drafter http client");
        Self { http, base_url }
    }

    pub async fn draft(&self, context: &DraftContext<'_>) -> Result<DrafterReply, AppError> {
        let response = self
            .http
            .post(format!("{}/v1/draft", self.base_url))
            .json(context)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AppError::DrafterTimeout
                } else {
                    AppError::DrafterUnavailable {
                        message: format!("drafter unreachable: {err}"),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Err(AppError::DrafterUnavailable {
                message: format!("drafter returned {}", response.status()),
            });
        }

        response
            .json::<DrafterReply>()
            .await
            .map_err(|err| AppError::DrafterInvalidResponse {
                message: format!("drafter reply did not match the expected envelope: {err}"),
            })
    }
}
