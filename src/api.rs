//! Client for the Chatlytics analysis service.
//!
//! The service takes a chat export as a multipart upload and answers with
//! per-user analytics, including an `Overall` aggregate.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::{Error, Result};

/// Environment variable holding the service base URL
pub const API_URL_ENV: &str = "CHATLYTICS_API_URL";
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Aggregate over every participant
pub const OVERALL: &str = "Overall";

/// Message, word and media counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicStats {
    #[serde(rename = "Total Number of Messages")]
    pub messages: u64,
    #[serde(rename = "Total Number of Words")]
    pub words: u64,
    #[serde(rename = "Total Number of Media Messages", default)]
    pub media_messages: u64,
}

/// Analytics for one participant (or the `Overall` aggregate).
///
/// Fields whose shape varies between service versions (sentiment, roles,
/// response times, ...) are kept as raw JSON in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserAnalytics {
    pub basic_stats: BasicStats,
    #[serde(default)]
    pub links_shared: u64,
    #[serde(default)]
    pub most_active_users: BTreeMap<String, u64>,
    #[serde(default)]
    pub daily_timeline: Vec<BTreeMap<String, Value>>,
    #[serde(default)]
    pub monthly_activity: Vec<BTreeMap<String, Value>>,
    #[serde(default)]
    pub most_common_words: BTreeMap<String, u64>,
    #[serde(default)]
    pub emoji_analysis: BTreeMap<String, u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub users: Vec<String>,
    pub analytics: BTreeMap<String, UserAnalytics>,
}

impl AnalysisResponse {
    pub fn overall(&self) -> Option<&UserAnalytics> {
        self.analytics.get(OVERALL)
    }

    pub fn user(&self, name: &str) -> Option<&UserAnalytics> {
        self.analytics.get(name)
    }
}

/// Uploads chat exports for analysis. Failures are not retried.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    client: Client,
    base: Url,
}

impl AnalysisClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::ConfigError(format!("invalid API URL '{}': {}", base_url, e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::NetworkError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base })
    }

    /// Base URL from `CHATLYTICS_API_URL`, falling back to the local default.
    pub fn from_env() -> Result<Self> {
        let base = std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::new(&base)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub async fn analyze_file(&self, path: impl AsRef<Path>) -> Result<AnalysisResponse> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "chat.txt".to_string());
        self.analyze_bytes(&name, bytes).await
    }

    pub async fn analyze_bytes(&self, file_name: &str, bytes: Vec<u8>) -> Result<AnalysisResponse> {
        let endpoint = self.endpoint()?;
        log::info!("Connecting to API: {}", endpoint);

        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().part("file", part);
        let res = self.client.post(endpoint).multipart(form).send().await?;

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            log::error!("analysis request failed with {}: {}", status, detail);
            return Err(Error::AnalysisFailed("Failed to analyze chat".to_string()));
        }

        let body = res.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::AnalysisFailed(format!("malformed analysis response: {}", e)))
    }

    fn endpoint(&self) -> Result<Url> {
        let mut base = self.base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join("analyze")
            .map_err(|e| Error::ConfigError(format!("invalid API URL: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "users": ["Overall", "Ana"],
        "analytics": {
            "Overall": {
                "basic_stats": {"Total Number of Messages": 120, "Total Number of Words": 800, "Total Number of Media Messages": 4},
                "links_shared": 3,
                "most_active_users": {"Ana": 70},
                "daily_timeline": [{"only_date": "2024-01-02", "message_count": 12}],
                "most_busy_weekday": "Monday",
                "sentiment": {"positive": 0.4}
            },
            "Ana": {"basic_stats": {"Total Number of Messages": 70, "Total Number of Words": 500}}
        }
    }"#;

    #[test]
    fn parses_analysis_response() {
        let res: AnalysisResponse = serde_json::from_str(SAMPLE).unwrap();
        let overall = res.overall().unwrap();
        assert_eq!(overall.basic_stats.messages, 120);
        assert_eq!(overall.basic_stats.media_messages, 4);
        assert_eq!(overall.most_active_users["Ana"], 70);
        assert_eq!(overall.extra["most_busy_weekday"], "Monday");
        assert!(overall.extra.contains_key("sentiment"));
        assert_eq!(res.user("Ana").unwrap().basic_stats.media_messages, 0);
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let c = AnalysisClient::new("http://example.test/api").unwrap();
        assert_eq!(c.endpoint().unwrap().as_str(), "http://example.test/api/analyze");
        let c = AnalysisClient::new("http://example.test").unwrap();
        assert_eq!(c.endpoint().unwrap().as_str(), "http://example.test/analyze");
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(AnalysisClient::new("not a url"), Err(Error::ConfigError(_))));
    }
}
