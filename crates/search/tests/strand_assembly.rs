//! Assembler tests over a synthetic corpus with a stubbed search
//! service: conversation 1 (root 1, replies 2/3), quoter 50, semantic
//! neighbors 60 (quoted by 61), 70 (direct quote of 1) and 80 (a
//! re-broadcast).

use async_trait::async_trait;
use std::sync::Arc;
use strand_graph::{QuoteIndex, TreeBuilder};
use strand_search::{
    MediaCache, SearchHit, SearchRequest, SeedProvenance, SemanticSearch, StrandAssembler,
    StrandConfig, StrandContext, StrandSeed,
};
use strand_store::{MediaDescription, Post, PostId, PostStore};

fn post(id: PostId, author_id: u64, conv: u64, reply_to: Option<PostId>, quoted: Option<PostId>) -> Post {
    Post {
        id,
        author_id,
        author_handle: format!("user{author_id}"),
        created_at: None,
        text: format!("body of {id}"),
        favorite_count: 0,
        repost_count: 0,
        reply_to,
        conversation_id: Some(conv),
        quoted_id: quoted,
        quote_count: 0,
    }
}

fn context() -> Arc<StrandContext> {
    let mut posts = vec![
        post(1, 100, 1, None, None),
        post(2, 200, 1, Some(1), None),
        post(3, 300, 1, Some(1), None),
        post(50, 500, 50, None, Some(1)),
        post(60, 600, 60, None, None),
        post(61, 610, 61, None, Some(60)),
        post(70, 700, 70, None, Some(1)),
        post(80, 800, 80, None, None),
    ];
    if let Some(rebroadcast) = posts.iter_mut().find(|p| p.id == 80) {
        rebroadcast.text = "RT @someone old news".to_string();
    }

    let trees = TreeBuilder::new().build_complete(posts.iter()).unwrap();
    let store = PostStore::from_posts(posts);
    let quotes = QuoteIndex::build(&store);
    Arc::new(StrandContext { store, trees, quotes })
}

struct StubSearch {
    keys: Vec<PostId>,
}

#[async_trait]
impl SemanticSearch for StubSearch {
    async fn search(&self, _query: &str, _request: &SearchRequest) -> strand_search::Result<Vec<SearchHit>> {
        Ok(self
            .keys
            .iter()
            .map(|id| SearchHit {
                key: id.to_string(),
                distance: 0.1,
                metadata: serde_json::Value::Null,
            })
            .collect())
    }
}

struct FailingSearch;

#[async_trait]
impl SemanticSearch for FailingSearch {
    async fn search(&self, _query: &str, _request: &SearchRequest) -> strand_search::Result<Vec<SearchHit>> {
        Err(strand_search::SearchError::Api("service down".into()))
    }
}

fn provenances(seeds: &[StrandSeed]) -> Vec<(PostId, SeedProvenance)> {
    seeds.iter().map(|s| (s.post_id, s.provenance)).collect()
}

#[tokio::test]
async fn seeds_combine_root_quoters_and_semantic_neighbors() {
    let ctx = context();
    let search = Arc::new(StubSearch { keys: vec![60, 70, 80, 999] });
    let assembler = StrandAssembler::new(Arc::clone(&ctx), search);

    let root = ctx.store.get(1).unwrap();
    let seeds = assembler.strand_seeds(root).await;

    // 70 is a direct quote of the root: arrives via the quote index, not
    // semantic search. 80 is a re-broadcast and 999 is absent from the
    // store; both are dropped.
    assert_eq!(
        provenances(&seeds),
        vec![
            (1, SeedProvenance::Root),
            (50, SeedProvenance::QuoteOfRoot),
            (70, SeedProvenance::QuoteOfRoot),
            (60, SeedProvenance::SemanticSearch),
            (61, SeedProvenance::QuoteOfSemanticSearch),
        ]
    );
}

#[tokio::test]
async fn semantic_failure_degrades_to_root_seeds() {
    let ctx = context();
    let assembler = StrandAssembler::new(Arc::clone(&ctx), Arc::new(FailingSearch));

    let root = ctx.store.get(1).unwrap();
    let seeds = assembler.strand_seeds(root).await;

    assert_eq!(
        provenances(&seeds),
        vec![
            (1, SeedProvenance::Root),
            (50, SeedProvenance::QuoteOfRoot),
            (70, SeedProvenance::QuoteOfRoot),
        ]
    );
}

#[tokio::test]
async fn missing_root_yields_diagnostic_strand() {
    let ctx = context();
    let assembler = StrandAssembler::new(ctx, Arc::new(StubSearch { keys: vec![] }));

    let strand = assembler.build_strand(424242).await;
    assert!(strand.seeds.is_empty());
    assert_eq!(strand.text, "No post found for id 424242.");
}

#[tokio::test]
async fn strand_text_annotates_seed_headers() {
    let ctx = context();
    let search = Arc::new(StubSearch { keys: vec![60] });
    let assembler = StrandAssembler::new(ctx, search);

    let strand = assembler.build_strand(1).await;
    assert!(strand.text.contains("[SEED:root]"), "{}", strand.text);
    assert!(strand.text.contains("[SEED:semantic-search]"), "{}", strand.text);
    // Replies 2 and 3 are reachable but not seeds.
    assert!(strand.text.contains("body of 2"), "{}", strand.text);
    assert!(!strand.text.contains("[id:2] [SEED:"), "{}", strand.text);
}

#[tokio::test]
async fn semantic_neighbors_ranked_by_quote_count_and_truncated() {
    let mut posts = vec![post(1, 100, 1, None, None)];
    for id in 10..15 {
        let mut p = post(id, id * 10, id, None, None);
        p.quote_count = id; // 14 most-quoted
        posts.push(p);
    }
    let trees = TreeBuilder::new().build_complete(posts.iter()).unwrap();
    let store = PostStore::from_posts(posts);
    let quotes = QuoteIndex::build(&store);
    let ctx = Arc::new(StrandContext { store, trees, quotes });

    let search = Arc::new(StubSearch { keys: vec![10, 11, 12, 13, 14] });
    let config = StrandConfig {
        semantic_limit: 2,
        ..Default::default()
    };
    let assembler = StrandAssembler::new(Arc::clone(&ctx), search).with_config(config);

    let root = ctx.store.get(1).unwrap();
    let seeds = assembler.strand_seeds(root).await;
    assert_eq!(
        provenances(&seeds),
        vec![
            (1, SeedProvenance::Root),
            (14, SeedProvenance::SemanticSearch),
            (13, SeedProvenance::SemanticSearch),
        ]
    );
}

#[tokio::test]
async fn media_descriptions_appear_in_rendered_text() {
    let ctx = context();
    let mut cache = MediaCache::new();
    cache.insert(
        1,
        vec![MediaDescription {
            url: "https://img.example/root.png".into(),
            description: "a chart".into(),
        }],
    );
    let assembler = StrandAssembler::new(ctx, Arc::new(StubSearch { keys: vec![] }))
        .with_media(Arc::new(cache));

    let strand = assembler.build_strand(1).await;
    assert!(
        strand.text.contains("[image: https://img.example/root.png]"),
        "{}",
        strand.text
    );
    assert!(strand.text.contains("a chart"), "{}", strand.text);
}

#[tokio::test]
async fn batch_preserves_input_order() {
    let ctx = context();
    let assembler = Arc::new(StrandAssembler::new(ctx, Arc::new(StubSearch { keys: vec![] })));

    let strands = assembler.build_strands(vec![60, 1, 424242], 2).await.unwrap();
    let roots: Vec<PostId> = strands.iter().map(|s| s.root_id).collect();
    assert_eq!(roots, vec![60, 1, 424242]);
}
