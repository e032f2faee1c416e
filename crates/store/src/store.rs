use crate::error::{Result, StoreError};
use crate::types::{Post, PostId};
use std::collections::HashMap;
use std::path::Path;

/// Id-keyed post collection, read-only during traversal and rendering.
///
/// Persistence is a single JSON document written with `tokio::fs`; at the
/// corpus scales this engine targets the whole map is held in memory after
/// one load, so random-access storage is left to the snapshot layer.
#[derive(Debug, Default)]
pub struct PostStore {
    posts: HashMap<PostId, Post>,
}

impl PostStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from any post collection. Later duplicates of an id
    /// replace earlier ones.
    pub fn from_posts(posts: impl IntoIterator<Item = Post>) -> Self {
        let posts: HashMap<PostId, Post> = posts.into_iter().map(|p| (p.id, p)).collect();
        Self { posts }
    }

    pub fn get(&self, id: PostId) -> Option<&Post> {
        self.posts.get(&id)
    }

    pub fn contains(&self, id: PostId) -> bool {
        self.posts.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Post> {
        self.posts.values()
    }

    /// Fold derived quote counts back into the posts. Called once after
    /// the quote index is built, before the store is shared.
    pub fn apply_quote_counts(&mut self, counts: &HashMap<PostId, u64>) {
        for (id, count) in counts {
            if let Some(post) = self.posts.get_mut(id) {
                post.quote_count = *count;
            }
        }
    }

    /// Load a snapshot in JSON-lines form (one post object per line).
    /// Blank lines are skipped; a malformed line is an error with its
    /// line number.
    pub async fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        log::info!("Loading post snapshot from {:?}", path.as_ref());
        let data = tokio::fs::read_to_string(&path).await?;

        let mut posts = HashMap::new();
        for (i, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let post: Post = serde_json::from_str(line)
                .map_err(|source| StoreError::SnapshotLine { line: i + 1, source })?;
            posts.insert(post.id, post);
        }

        log::info!("Loaded {} posts", posts.len());
        Ok(Self { posts })
    }

    /// Save the store as a JSON document.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        log::info!("Saving post store to {:?}", path.as_ref());
        let data = serde_json::to_string(&self.posts)?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    /// Load a store previously written by [`PostStore::save`].
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        log::info!("Loading post store from {:?}", path.as_ref());
        let data = tokio::fs::read_to_string(&path).await?;
        let posts: HashMap<PostId, Post> = serde_json::from_str(&data)?;
        log::info!("Loaded {} posts", posts.len());
        Ok(Self { posts })
    }
}
