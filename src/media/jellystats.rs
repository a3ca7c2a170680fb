use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use super::{RemoteError, StatsSource, json_seconds, validate_user_id};

/// Watch time from a Jellystats instance
///
/// Jellystats only answers "the last N hours", so the requested start day is
/// translated into hours elapsed since its local midnight.
#[derive(Debug, Clone)]
pub struct JellystatsSource {
    client: Client,
    stats_url: String,
    token: String,
}

impl JellystatsSource {
    pub fn new(client: Client, base_url: &str, token: &str) -> Self {
        Self {
            client,
            stats_url: format!("{}/stats/getGlobalUserStats", base_url.trim_end_matches('/')),
            token: token.to_string(),
        }
    }
}

/// Whole hours from local midnight of `start` until `now`, rounded up, at least 1
pub(crate) fn hours_since(start: NaiveDate, now: DateTime<Local>) -> i64 {
    let midnight = start
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest());

    let Some(midnight) = midnight else {
        return 24;
    };

    let seconds = (now - midnight).num_seconds();
    ((seconds + 3599) / 3600).max(1)
}

#[async_trait]
impl StatsSource for JellystatsSource {
    async fn total_seconds(
        &self,
        user_id: &str,
        start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<u64, RemoteError> {
        validate_user_id(user_id)?;
        let hours = hours_since(start, Local::now());
        let url = &self.stats_url;

        let response = self
            .client
            .post(url)
            .header("x-api-token", &self.token)
            .header("Accept", "application/json")
            .json(&json!({ "hours": hours.to_string(), "userid": user_id }))
            .send()
            .await
            .map_err(|e| RemoteError::transport(url, e))?;

        if response.status() != StatusCode::OK {
            return Err(RemoteError::Status {
                url: url.clone(),
                status: response.status().as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RemoteError::decode(url, e.to_string()))?;

        match body.get("total_playback_duration") {
            None | Some(Value::Null) => Ok(0),
            Some(value) => json_seconds(value)
                .ok_or_else(|| RemoteError::decode(url, "bad total_playback_duration")),
        }
    }
}
