//! Store backed by an Elasticsearch-compatible document API.
//!
//! Rows live in one index with the region code as document id, so
//! `PUT /{index}/_doc/{uf}` replaces the previous row for that region.

use super::{RegionRow, RegionStore, StoreError, UpsertStatus};
use crate::config::StoreConfig;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_INDEX: &str = "accident_stats";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Upper bound on rows returned by one search; one row per region.
const SEARCH_SIZE: usize = 1000;

pub struct HttpStore {
    client: reqwest::Client,
    base_url: Url,
    index: String,
    credentials: Option<(String, Option<String>)>,
}

#[derive(Deserialize)]
struct IndexResponse {
    result: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: RegionRow,
}

#[derive(Deserialize)]
struct GetResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source")]
    source: Option<RegionRow>,
}

impl HttpStore {
    pub fn builder() -> HttpStoreBuilder {
        HttpStoreBuilder::new()
    }

    /// Build from configuration. `Ok(None)` when no URL is configured.
    pub fn from_config(config: &StoreConfig) -> Result<Option<Self>, StoreError> {
        let Some(url) = config.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };

        let mut builder = Self::builder()
            .with_url(url)
            .with_index(&config.index)
            .with_timeout(Duration::from_secs(config.timeout_seconds));

        if let Some(ref username) = config.username {
            builder = builder.with_credentials(username, config.password.as_deref());
        }

        builder.build().map(Some)
    }

    /// `{base}/{index}/{segments...}`
    fn index_url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "cannot be a base URL".to_string(),
            })?
            .pop_if_empty()
            .push(&self.index)
            .extend(segments);
        Ok(url)
    }

    fn document_url(&self, uf: &str) -> Result<Url, StoreError> {
        self.index_url(&["_doc", uf])
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some((username, password)) => request.basic_auth(username, password.as_deref()),
            None => request,
        }
    }
}

impl RegionStore for HttpStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let response = self
            .authorize(self.client.get(self.base_url.clone()))
            .send()
            .await
            .map_err(|source| StoreError::Unreachable {
                url: self.base_url.to_string(),
                source,
            })?;

        response
            .error_for_status()
            .map_err(|source| StoreError::Unreachable {
                url: self.base_url.to_string(),
                source,
            })?;

        debug!("Store at {} is available", self.base_url);
        Ok(())
    }

    async fn upsert(&self, row: &RegionRow) -> Result<UpsertStatus, StoreError> {
        let url = self.document_url(&row.uf)?;
        let response = self.authorize(self.client.put(url)).json(row).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                uf: row.uf.clone(),
                status,
                body,
            });
        }

        let indexed: IndexResponse = response.json().await?;
        Ok(match indexed.result.as_str() {
            "created" => UpsertStatus::Created,
            _ => UpsertStatus::Updated,
        })
    }

    async fn fetch(&self, uf: &str) -> Result<Option<RegionRow>, StoreError> {
        let url = self.document_url(uf)?;
        let response = self.authorize(self.client.get(url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let document: GetResponse = response.error_for_status()?.json().await?;
        Ok(document.source.filter(|_| document.found))
    }

    async fn fetch_all(&self) -> Result<Vec<RegionRow>, StoreError> {
        let url = self.index_url(&["_search"])?;
        let query = serde_json::json!({
            "size": SEARCH_SIZE,
            "query": { "match_all": {} }
        });
        let response = self.authorize(self.client.post(url)).json(&query).send().await?;

        // Nothing has been loaded yet
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let search: SearchResponse = response.error_for_status()?.json().await?;
        debug!("Fetched {} rows from {}", search.hits.hits.len(), self.index);

        Ok(search.hits.hits.into_iter().map(|hit| hit.source).collect())
    }
}

pub struct HttpStoreBuilder {
    url: String,
    index: String,
    credentials: Option<(String, Option<String>)>,
    timeout: Duration,
}

impl Default for HttpStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpStoreBuilder {
    pub fn new() -> Self {
        Self {
            url: String::from("http://127.0.0.1:9200/"),
            index: DEFAULT_INDEX.to_string(),
            credentials: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_index(mut self, index: &str) -> Self {
        self.index = index.to_string();
        self
    }

    pub fn with_credentials(mut self, username: &str, password: Option<&str>) -> Self {
        self.credentials = Some((username.to_string(), password.map(str::to_string)));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HttpStore, StoreError> {
        let base_url = Url::parse(&self.url).map_err(|e| StoreError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;

        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl {
                url: self.url,
                reason: "cannot be a base URL".to_string(),
            });
        }

        if self.index.trim().is_empty() {
            return Err(StoreError::InvalidUrl {
                url: self.url,
                reason: "index name is required".to_string(),
            });
        }

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        Ok(HttpStore {
            client,
            base_url,
            index: self.index,
            credentials: self.credentials,
        })
    }
}
