//! Where monitoring documents come from

use async_trait::async_trait;
use bucketwise::config::SearchConfig;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::{Result, TelemetryError};
use crate::query::HighLevelStatsQuery;

/// Executes monitoring searches
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Run the search and return the raw response document
    async fn search(&self, query: &HighLevelStatsQuery) -> Result<Value>;
}

/// Search backend reached over HTTP
pub struct HttpStatsSource {
    client: Client,
    base_url: String,
}

impl HttpStatsSource {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl StatsSource for HttpStatsSource {
    async fn search(&self, query: &HighLevelStatsQuery) -> Result<Value> {
        let url = format!("{}/{}/_search", self.base_url, query.index);
        tracing::debug!(%url, "Searching monitoring index");

        let response = self
            .client
            .post(&url)
            .query(&query.query_params())
            .json(&query.body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TelemetryError::Status { status, body });
        }

        Ok(response.json().await?)
    }
}
