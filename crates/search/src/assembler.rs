use crate::error::{Result, SearchError};
use crate::media::MediaDescriber;
use crate::seeds::{dedupe_seeds, SeedProvenance, StrandSeed};
use crate::semantic::{SearchRequest, SemanticSearch};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use strand_graph::{default_header, ConversationKey, ConversationTree, DepthBounds, QuoteIndex, StrandRenderer};
use strand_store::{MediaDescription, Post, PostId, PostStore};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Worker pool size for per-seed media fetches; the description service
/// is rate-limited.
const MEDIA_FETCH_WORKERS: usize = 4;

/// Read-only batch structures shared by every strand computation. Built
/// once, then held behind an `Arc` for the duration of the run.
pub struct StrandContext {
    pub store: PostStore,
    pub trees: BTreeMap<ConversationKey, ConversationTree>,
    pub quotes: QuoteIndex,
}

/// Knobs for seed discovery and rendering.
#[derive(Debug, Clone)]
pub struct StrandConfig {
    /// Cap on semantic neighbors kept after filtering and ranking.
    pub semantic_limit: usize,
    /// Candidates requested from the search service before filtering.
    pub k: usize,
    pub threshold: f32,
    pub bounds: DepthBounds,
    pub exclude_keywords: Vec<String>,
}

impl Default for StrandConfig {
    fn default() -> Self {
        Self {
            semantic_limit: 20,
            k: 100,
            threshold: 0.5,
            bounds: DepthBounds::unbounded(),
            exclude_keywords: Vec::new(),
        }
    }
}

/// One assembled strand: the seed set that went into the render and the
/// rendered text itself.
#[derive(Debug, Clone)]
pub struct Strand {
    pub root_id: PostId,
    pub seeds: Vec<StrandSeed>,
    pub text: String,
}

/// Composes seed discovery, the neighborhood filter, and the renderer
/// into one strand per root post.
///
/// Collaborator failures never abort a strand: a failed semantic search
/// degrades to root-derived seeds only, and a failed media fetch leaves
/// that post without descriptions. Both are logged.
pub struct StrandAssembler {
    context: Arc<StrandContext>,
    search: Arc<dyn SemanticSearch>,
    media: Option<Arc<dyn MediaDescriber>>,
    config: StrandConfig,
}

impl StrandAssembler {
    pub fn new(context: Arc<StrandContext>, search: Arc<dyn SemanticSearch>) -> Self {
        Self {
            context,
            search,
            media: None,
            config: StrandConfig::default(),
        }
    }

    pub fn with_media(mut self, media: Arc<dyn MediaDescriber>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_config(mut self, config: StrandConfig) -> Self {
        self.config = config;
        self
    }

    /// Semantic neighbors of the root, filtered and ranked: candidates
    /// must exist in the store, must not be direct quotes of the root
    /// (those arrive as quote-of-root seeds already), and must not be
    /// plain re-broadcasts. Survivors are ranked by quote count
    /// descending (id ascending as tie-break) and truncated.
    async fn semantic_neighbors(&self, root: &Post) -> Result<Vec<PostId>> {
        let request = SearchRequest {
            k: self.config.k,
            threshold: self.config.threshold,
            exclude_id: Some(root.id),
            exclude_keywords: self.config.exclude_keywords.clone(),
        };
        let hits = self.search.search(&root.text, &request).await?;

        let mut neighbors: Vec<&Post> = hits
            .iter()
            .filter_map(|hit| hit.post_id())
            .filter_map(|id| self.context.store.get(id))
            .filter(|post| post.quoted_id != Some(root.id))
            .filter(|post| !post.is_rebroadcast())
            .collect();

        neighbors.sort_by(|a, b| b.quote_count.cmp(&a.quote_count).then(a.id.cmp(&b.id)));
        neighbors.truncate(self.config.semantic_limit);
        Ok(neighbors.into_iter().map(|post| post.id).collect())
    }

    /// Full seed list for one root, deduplicated with root-derived seeds
    /// outranking semantic discoveries.
    pub async fn strand_seeds(&self, root: &Post) -> Vec<StrandSeed> {
        let mut seeds = vec![StrandSeed::new(root.id, SeedProvenance::Root)];
        for quoter in self.context.quotes.quoters_of(root.id) {
            seeds.push(StrandSeed::new(*quoter, SeedProvenance::QuoteOfRoot));
        }

        match self.semantic_neighbors(root).await {
            Ok(neighbors) => {
                for id in &neighbors {
                    seeds.push(StrandSeed::new(*id, SeedProvenance::SemanticSearch));
                }
                for id in &neighbors {
                    for quoter in self.context.quotes.quoters_of(*id) {
                        seeds.push(StrandSeed::new(
                            *quoter,
                            SeedProvenance::QuoteOfSemanticSearch,
                        ));
                    }
                }
            }
            Err(err) => {
                log::warn!(
                    "Semantic search failed for post {}, continuing with root-derived seeds: {}",
                    root.id,
                    err
                );
            }
        }

        dedupe_seeds(seeds)
    }

    /// Media descriptions for the seed posts, fetched with a small worker
    /// pool. Per-post failures are logged and skipped.
    async fn seed_media(&self, seeds: &[StrandSeed]) -> HashMap<PostId, Vec<MediaDescription>> {
        let mut lookup = HashMap::new();
        let Some(describer) = &self.media else {
            return lookup;
        };

        let semaphore = Arc::new(Semaphore::new(MEDIA_FETCH_WORKERS));
        let mut tasks = JoinSet::new();
        for seed in seeds {
            let describer = Arc::clone(describer);
            let semaphore = Arc::clone(&semaphore);
            let id = seed.post_id;
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await.ok();
                (id, describer.describe(id).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(descriptions))) if !descriptions.is_empty() => {
                    lookup.insert(id, descriptions);
                }
                Ok((_, Ok(_))) => {}
                Ok((id, Err(err))) => {
                    log::warn!("Media description failed for post {}: {}", id, err);
                }
                Err(err) => {
                    log::warn!("Media fetch task failed: {}", err);
                }
            }
        }
        lookup
    }

    /// Assemble one strand. A root absent from the store yields a
    /// diagnostic strand with empty seeds, not an error.
    pub async fn build_strand(&self, root_id: PostId) -> Strand {
        let Some(root) = self.context.store.get(root_id) else {
            log::warn!("Post {} not in store, returning empty strand", root_id);
            return Strand {
                root_id,
                seeds: Vec::new(),
                text: format!("No post found for id {root_id}."),
            };
        };

        let seeds = self.strand_seeds(root).await;
        let media = self.seed_media(&seeds).await;

        let provenance: HashMap<PostId, SeedProvenance> = seeds
            .iter()
            .map(|seed| (seed.post_id, seed.provenance))
            .collect();
        let header = move |post: &Post| match provenance.get(&post.id) {
            Some(prov) => format!("{} [SEED:{}]", default_header(post), prov),
            None => default_header(post),
        };

        let seed_ids: Vec<PostId> = seeds.iter().map(|seed| seed.post_id).collect();
        let text = StrandRenderer::new(&self.context.store, &self.context.trees, self.config.bounds)
            .with_header(header)
            .with_media(&media)
            .render(&seed_ids);

        Strand {
            root_id,
            seeds,
            text,
        }
    }

    /// Assemble many strands with bounded concurrency. Results come back
    /// in input order.
    pub async fn build_strands(
        self: Arc<Self>,
        root_ids: Vec<PostId>,
        workers: usize,
    ) -> Result<Vec<Strand>> {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut tasks = JoinSet::new();

        for (index, root_id) in root_ids.into_iter().enumerate() {
            let assembler = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|err| SearchError::Api(err.to_string()))?;
                Ok::<_, SearchError>((index, assembler.build_strand(root_id).await))
            });
        }

        let mut strands: Vec<Option<Strand>> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (index, strand) = joined??;
            if strands.len() <= index {
                strands.resize_with(index + 1, || None);
            }
            strands[index] = Some(strand);
        }

        Ok(strands.into_iter().flatten().collect())
    }
}
