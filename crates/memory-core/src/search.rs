//! ============================================================================
//! SearxNG Client - Outbound web search
//! ============================================================================
//! `GET {url}?q=<query>&...` with only the options that are set. The JSON
//! body is returned untouched; pass `format: Some("json")` unless the
//! instance defaults to it.
//! ============================================================================

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Optional SearxNG query parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub categories: Option<String>,
    pub engines: Option<String>,
    pub language: Option<String>,
    pub page: Option<u32>,
    pub time_range: Option<String>,
    pub format: Option<String>,
    pub results_on_new_tab: Option<bool>,
    pub image_proxy: Option<bool>,
    pub autocomplete: Option<String>,
    /// 0 = off, 1 = moderate, 2 = strict
    pub safesearch: Option<u8>,
    pub theme: Option<String>,
    pub enabled_plugins: Option<String>,
    pub disabled_plugins: Option<String>,
    pub enabled_engines: Option<String>,
    pub disabled_engines: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            categories: None,
            engines: None,
            language: None,
            page: Some(1),
            time_range: None,
            format: None,
            results_on_new_tab: None,
            image_proxy: None,
            autocomplete: None,
            safesearch: None,
            theme: None,
            enabled_plugins: None,
            disabled_plugins: None,
            enabled_engines: None,
            disabled_engines: None,
        }
    }
}

impl SearchOptions {
    /// Query pairs for `query`, absent options omitted
    pub fn to_query(&self, query: &str) -> Vec<(&'static str, String)> {
        let mut params = vec![("q", query.to_string())];

        let mut push = |key: &'static str, value: Option<String>| {
            if let Some(value) = value {
                params.push((key, value));
            }
        };

        push("categories", self.categories.clone());
        push("engines", self.engines.clone());
        push("language", self.language.clone());
        push("page", self.page.map(|p| p.to_string()));
        push("time_range", self.time_range.clone());
        push("format", self.format.clone());
        push(
            "results_on_new_tab",
            self.results_on_new_tab.map(|b| if b { "1" } else { "0" }.to_string()),
        );
        push("image_proxy", self.image_proxy.map(|b| b.to_string()));
        push("autocomplete", self.autocomplete.clone());
        push("safesearch", self.safesearch.map(|s| s.to_string()));
        push("theme", self.theme.clone());
        push("enabled_plugins", self.enabled_plugins.clone());
        push("disabled_plugins", self.disabled_plugins.clone());
        push("enabled_engines", self.enabled_engines.clone());
        push("disabled_engines", self.disabled_engines.clone());

        params
    }
}

/// Client for one SearxNG instance
pub struct SearxngClient {
    client: Client,
    url: String,
}

impl SearxngClient {
    /// `url` is the full search endpoint, e.g. `http://localhost:8080/search`
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Value> {
        let params = options.to_query(query);
        debug!("SearxNG search '{}' ({} params)", query, params.len());

        let response = self
            .client
            .get(&self.url)
            .query(&params)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send search request: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read search response: {}", e))?;

        if !status.is_success() {
            return Err(anyhow!("SearxNG error ({}): {}", status, body));
        }

        serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse search response: {} - body: {}", e, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_default_query_has_page_only() {
        let params = SearchOptions::default().to_query("rust");
        assert_eq!(
            params,
            vec![("q", "rust".to_string()), ("page", "1".to_string())]
        );
    }

    #[test]
    fn test_set_options_are_sent() {
        let options = SearchOptions {
            page: None,
            format: Some("json".into()),
            safesearch: Some(2),
            results_on_new_tab: Some(true),
            image_proxy: Some(false),
            ..Default::default()
        };

        let params = options.to_query("rust");
        assert_eq!(
            params,
            vec![
                ("q", "rust".to_string()),
                ("format", "json".to_string()),
                ("results_on_new_tab", "1".to_string()),
                ("image_proxy", "false".to_string()),
                ("safesearch", "2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_search_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "tokio"))
            .and(query_param("format", "json"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": "tokio",
                "results": [{"title": "Tokio", "url": "https://tokio.rs"}]
            })))
            .mount(&server)
            .await;

        let client = SearxngClient::new(&format!("{}/search", server.uri()));
        let options = SearchOptions {
            format: Some("json".into()),
            ..Default::default()
        };
        let body = client.search("tokio", &options).await.unwrap();
        assert_eq!(body["results"][0]["url"], "https://tokio.rs");
    }

    #[tokio::test]
    async fn test_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .mount(&server)
            .await;

        let client = SearxngClient::new(&server.uri());
        let err = client
            .search("tokio", &SearchOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
