use crate::error::{Result, SearchError};
use crate::retry::with_retry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use strand_store::PostId;

/// Query against the embedding service. `exclude_id` drops the query
/// post itself from the results; `exclude_keywords` become must-not text
/// clauses.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub k: usize,
    pub threshold: f32,
    pub exclude_id: Option<PostId>,
    pub exclude_keywords: Vec<String>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            k: 100,
            threshold: 0.5,
            exclude_id: None,
            exclude_keywords: Vec::new(),
        }
    }
}

/// One ranked candidate from the embedding service. Only `key` (the post
/// id) and `distance` matter to the core; the metadata blob is carried
/// through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub key: String,
    pub distance: f32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SearchHit {
    pub fn post_id(&self) -> Option<PostId> {
        self.key.parse().ok()
    }
}

/// Black-box semantic similarity search. The core never depends on the
/// service's ranking internals, only on the returned ids.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    async fn search(&self, query: &str, request: &SearchRequest) -> Result<Vec<SearchHit>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// HTTP client for the embedding search service
/// (`POST <endpoint>` with `{searchTerm, k, threshold, filter}`).
pub struct HttpSemanticSearch {
    client: reqwest::Client,
    endpoint: String,
    max_attempts: usize,
}

impl HttpSemanticSearch {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            max_attempts: 3,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn payload(&self, query: &str, request: &SearchRequest) -> serde_json::Value {
        let mut payload = json!({
            "searchTerm": query,
            "k": request.k,
            "threshold": request.threshold,
        });
        if !request.exclude_keywords.is_empty() {
            let must_not: Vec<serde_json::Value> = request
                .exclude_keywords
                .iter()
                .map(|kw| json!({"key": "text", "match": {"text": kw}}))
                .collect();
            payload["filter"] = json!({ "must_not": must_not });
        }
        payload
    }
}

#[async_trait]
impl SemanticSearch for HttpSemanticSearch {
    async fn search(&self, query: &str, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let payload = self.payload(query, request);

        let response: SearchResponse = with_retry(
            self.max_attempts,
            Duration::from_secs(1),
            || async {
                let resp = self
                    .client
                    .post(&self.endpoint)
                    .json(&payload)
                    .send()
                    .await?;
                if !resp.status().is_success() {
                    return Err(SearchError::Api(format!(
                        "search endpoint returned {}",
                        resp.status()
                    )));
                }
                Ok(resp.json::<SearchResponse>().await?)
            },
        )
        .await?;

        if !response.success {
            log::warn!("Search API reported failure for query");
            return Ok(Vec::new());
        }

        let exclude = request.exclude_id.map(|id| id.to_string());
        Ok(response
            .results
            .into_iter()
            .filter(|hit| exclude.as_deref() != Some(hit.key.as_str()))
            .collect())
    }
}
