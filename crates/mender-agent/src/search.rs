//! Auxiliary web search for advisory prompts

use async_trait::async_trait;
use mender_core::config::SearchConfig;
use mender_core::{MenderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
}

impl fmt::Display for SearchHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.title.is_empty() {
            write!(f, "{}", self.url)
        } else {
            write!(f, "{} ({})", self.title, self.url)
        }
    }
}

/// Source of auxiliary search results
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
}

/// Tavily search API client
#[derive(Debug, Clone)]
pub struct TavilySearch {
    config: SearchConfig,
    client: reqwest::Client,
}

impl TavilySearch {
    pub fn new(config: SearchConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MenderError::Search(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| MenderError::Auth("No TAVILY_API_KEY configured".to_string()))?;

        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .json(&TavilyRequest {
                api_key,
                query,
                max_results,
            })
            .send()
            .await
            .map_err(|e| MenderError::Search(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            return Err(MenderError::Search(format!(
                "Search API error {}",
                response.status()
            )));
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| MenderError::Search(format!("Failed to parse response: {}", e)))?;

        Ok(parsed
            .results
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
            })
            .collect())
    }
}
