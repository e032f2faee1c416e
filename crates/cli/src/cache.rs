use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use strand_graph::{ConversationKey, ConversationTree, QuoteIndex};
use strand_search::StrandContext;
use strand_store::{PostId, PostStore};

const STORE_FILE: &str = "store.json";
const TREES_FILE: &str = "trees.json";
const QUOTES_FILE: &str = "quotes.json";
const MEDIA_FILE: &str = "media.json";

/// Snapshot cache directory written by `strand index` and read by the
/// render and batch commands: `store.json`, `trees.json`, `quotes.json`,
/// plus an optional `media.json` maintained out of band.
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn media_path(&self) -> PathBuf {
        self.root.join(MEDIA_FILE)
    }

    fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    pub async fn save(
        &self,
        store: &PostStore,
        trees: &BTreeMap<ConversationKey, ConversationTree>,
        quotes: &QuoteIndex,
    ) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create cache dir {}", self.root.display()))?;

        store
            .save(self.path(STORE_FILE))
            .await
            .context("Failed to write post store cache")?;
        write_json(&self.path(TREES_FILE), trees).await?;
        write_json(&self.path(QUOTES_FILE), quotes.entries()).await?;
        Ok(())
    }

    /// Load the three batch structures back into one shared context.
    pub async fn load_context(&self) -> Result<StrandContext> {
        let store = PostStore::load(self.path(STORE_FILE))
            .await
            .with_context(|| format!("No post store cache under {}", self.root.display()))?;
        let trees: BTreeMap<ConversationKey, ConversationTree> =
            read_json(&self.path(TREES_FILE)).await?;
        let entries: HashMap<PostId, Vec<PostId>> = read_json(&self.path(QUOTES_FILE)).await?;

        log::info!(
            "Loaded cache: {} posts, {} trees, {} quoted posts",
            store.len(),
            trees.len(),
            entries.len()
        );
        Ok(StrandContext {
            store,
            trees,
            quotes: QuoteIndex::from_entries(entries),
        })
    }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_string(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Failed to parse {}", path.display()))
}
