//! JSON over HTTPS remote client.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{PushAck, RangeSnapshot, RemoteClient, ServerEdits, SummaryAck};
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::{AttendanceRecord, DailySummary};
use crate::util::{error_excerpt, has_http_scheme, non_blank};

const ATTENDANCE_BATCH_PATH: &str = "/v1/attendance/batch";
const SUMMARY_BATCH_PATH: &str = "/v1/summaries/batch";
const EDITS_PATH: &str = "/v1/attendance/edits";
const RANGE_PATH: &str = "/v1/sync/range";

#[derive(Clone)]
pub struct HttpRemoteClient {
    base_url: String,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteClient")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpRemoteClient {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Result<Self> {
        Self::with_client(base_url, api_token, reqwest::Client::builder().build()?)
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| Error::Config("remote.base_url is not set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Self::with_client(base_url, config.api_token.clone(), client)
    }

    fn with_client(
        base_url: impl Into<String>,
        api_token: Option<String>,
        client: reqwest::Client,
    ) -> Result<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url.into())?,
            api_token: non_blank(api_token),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Accept", "application/json");
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = self.authorize(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Network(parse_api_error(status, &body)));
        }

        Ok(response.json::<T>().await?)
    }
}

#[derive(Serialize)]
struct AttendanceBatch<'a> {
    records: &'a [AttendanceRecord],
}

#[derive(Serialize)]
struct SummaryBatch<'a> {
    summaries: &'a [DailySummary],
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn push_attendance(&self, records: &[AttendanceRecord]) -> Result<PushAck> {
        tracing::debug!(count = records.len(), "Pushing attendance batch");
        let request = self
            .client
            .post(self.url(ATTENDANCE_BATCH_PATH))
            .json(&AttendanceBatch { records });
        self.send(request).await
    }

    async fn push_summary(&self, summaries: &[DailySummary]) -> Result<SummaryAck> {
        tracing::debug!(count = summaries.len(), "Pushing summary batch");
        let request = self
            .client
            .post(self.url(SUMMARY_BATCH_PATH))
            .json(&SummaryBatch { summaries });
        self.send(request).await
    }

    async fn pull_server_edits(&self, since: NaiveDateTime) -> Result<ServerEdits> {
        let since = since.format("%Y-%m-%dT%H:%M:%S").to_string();
        let url = format!(
            "{}?since={}",
            self.url(EDITS_PATH),
            urlencoding::encode(&since)
        );
        self.send(self.client.get(url)).await
    }

    async fn pull_full_range(&self, start: NaiveDate, end: NaiveDate) -> Result<RangeSnapshot> {
        let url = format!(
            "{}?start={}&end={}",
            self.url(RANGE_PATH),
            urlencoding::encode(&start.format("%Y-%m-%d").to_string()),
            urlencoding::encode(&end.format("%Y-%m-%d").to_string())
        );
        self.send(self.client.get(url)).await
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", error_excerpt(&message), status.as_u16());
        }
    }

    let trimmed = error_excerpt(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let base_url = non_blank(Some(raw))
        .ok_or_else(|| Error::Config("remote base URL must not be empty".to_string()))?;
    if has_http_scheme(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(
            "remote base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_base_url(" https://api.example.com/ ".to_string()).unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        let message = parse_api_error(
            StatusCode::BAD_REQUEST,
            r#"{"error": "bad_request", "message": "unknown employee"}"#,
        );
        assert_eq!(message, "unknown employee (400)");

        let message = parse_api_error(StatusCode::BAD_GATEWAY, "  ");
        assert_eq!(message, "HTTP 502");

        let message = parse_api_error(StatusCode::SERVICE_UNAVAILABLE, "maintenance");
        assert_eq!(message, "maintenance (503)");
    }

    #[test]
    fn debug_redacts_token() {
        let client =
            HttpRemoteClient::new("https://api.example.com", Some("secret".to_string())).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn from_config_requires_base_url() {
        let config = RemoteConfig::default();
        assert!(matches!(
            HttpRemoteClient::from_config(&config),
            Err(Error::Config(_))
        ));
    }
}
