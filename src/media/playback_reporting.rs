use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use super::{RemoteError, StatsSource, json_seconds, validate_user_id};
use crate::limits::format_day;

/// Watch time from the Playback Reporting plugin's SQL endpoint
#[derive(Debug, Clone)]
pub struct PlaybackReportingSource {
    client: Client,
    query_url: String,
    token: String,
}

impl PlaybackReportingSource {
    pub fn new(client: Client, server_url: &str, token: &str) -> Self {
        Self {
            client,
            query_url: format!(
                "{}/user_usage_stats/submit_custom_query",
                server_url.trim_end_matches('/')
            ),
            token: token.to_string(),
        }
    }
}

/// Sum of play durations for one user between two dates
pub(crate) fn build_usage_query(
    user_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<String, RemoteError> {
    validate_user_id(user_id)?;
    Ok(format!(
        "SELECT SUM(PlayDuration) AS TotalTime FROM PlaybackActivity WHERE UserId='{}' \
         AND DateCreated > '{}' AND DateCreated < '{}'",
        user_id,
        format_day(start),
        format_day(end)
    ))
}

/// First cell of the result table; an empty sum comes back as null
pub(crate) fn parse_query_total(body: &Value) -> Option<u64> {
    let cell = body.get("results")?.get(0)?.get(0)?;
    if cell.is_null() {
        return Some(0);
    }
    json_seconds(cell)
}

#[async_trait]
impl StatsSource for PlaybackReportingSource {
    async fn total_seconds(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, RemoteError> {
        let sql = build_usage_query(user_id, start, end)?;
        let url = &self.query_url;

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("MediaBrowser Token={}", self.token))
            .header("Accept", "application/json")
            .json(&json!({ "CustomQueryString": sql }))
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

        parse_query_total(&body)
            .ok_or_else(|| RemoteError::decode(url, "missing results[0][0]"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, d).unwrap()
    }

    #[test]
    fn test_query_covers_the_day_range() {
        let sql = build_usage_query("abc123", day(9), day(10)).unwrap();
        assert!(sql.contains("UserId='abc123'"));
        assert!(sql.contains("DateCreated > '2024-11-09'"));
        assert!(sql.contains("DateCreated < '2024-11-10'"));
    }

    #[test]
    fn test_query_rejects_injection() {
        assert!(build_usage_query("a' OR 1=1 --", day(9), day(10)).is_err());
    }

    #[test]
    fn test_parse_query_total() {
        assert_eq!(parse_query_total(&json!({"results": [["5400"]]})), Some(5400));
        assert_eq!(parse_query_total(&json!({"results": [[5400]]})), Some(5400));
        assert_eq!(parse_query_total(&json!({"results": [[null]]})), Some(0));
        assert_eq!(parse_query_total(&json!({"results": []})), None);
        assert_eq!(parse_query_total(&json!({})), None);
    }

    #[test]
    fn test_query_url() {
        let source = PlaybackReportingSource::new(Client::new(), "http://jf:8096/", "t");
        assert_eq!(
            source.query_url,
            "http://jf:8096/user_usage_stats/submit_custom_query"
        );
    }
}
