use crate::error::{Result, SearchError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use strand_store::{MediaDescription, PostId};

/// Black-box media enrichment: url + description pairs per post. An
/// empty result is normal (most posts carry no media).
#[async_trait]
pub trait MediaDescriber: Send + Sync {
    async fn describe(&self, post_id: PostId) -> Result<Vec<MediaDescription>>;
}

#[derive(Debug, Deserialize)]
struct MediaRow {
    media_url: String,
    #[serde(default)]
    description: Option<String>,
}

/// HTTP client for the media-description service
/// (`GET <base_url>/media?post_id=<id>` returning described rows).
pub struct HttpMediaDescriber {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMediaDescriber {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MediaDescriber for HttpMediaDescriber {
    async fn describe(&self, post_id: PostId) -> Result<Vec<MediaDescription>> {
        let url = format!("{}/media?post_id={}", self.base_url, post_id);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(SearchError::Api(format!(
                "media endpoint returned {} for post {}",
                resp.status(),
                post_id
            )));
        }
        let rows: Vec<MediaRow> = resp.json().await?;
        Ok(rows
            .into_iter()
            .map(|row| MediaDescription {
                url: row.media_url,
                description: row.description.unwrap_or_default(),
            })
            .collect())
    }
}

/// Persistent post id -> descriptions table. Loaded once per batch; the
/// describer only fills ids missing from it. Saved as one JSON document.
#[derive(Debug, Default)]
pub struct MediaCache {
    entries: HashMap<PostId, Vec<MediaDescription>>,
}

impl MediaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: PostId) -> Option<&Vec<MediaDescription>> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: PostId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn insert(&mut self, id: PostId, descriptions: Vec<MediaDescription>) {
        self.entries.insert(id, descriptions);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup table in the form the renderer consumes.
    pub fn as_lookup(&self) -> &HashMap<PostId, Vec<MediaDescription>> {
        &self.entries
    }

    /// Load the cache, treating a missing file as empty.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = tokio::fs::read_to_string(path).await?;
        let entries: HashMap<PostId, Vec<MediaDescription>> = serde_json::from_str(&data)?;
        log::info!("Loaded media cache with {} posts", entries.len());
        Ok(Self { entries })
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_string(&self.entries)?;
        tokio::fs::write(&path, data).await?;
        log::info!("Saved media cache with {} posts", self.entries.len());
        Ok(())
    }
}

#[async_trait]
impl MediaDescriber for MediaCache {
    async fn describe(&self, post_id: PostId) -> Result<Vec<MediaDescription>> {
        Ok(self.get(post_id).cloned().unwrap_or_default())
    }
}
