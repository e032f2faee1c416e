use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use strand_graph::{DepthBounds, QuoteIndex, StrandRenderer, TreeBuilder};
use strand_search::{HttpSemanticSearch, MediaCache, StrandAssembler, StrandConfig};
use strand_store::{PostId, PostStore};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

mod cache;
mod config;

use cache::CacheDir;
use config::AppConfig;

#[derive(Parser)]
#[command(name = "strand")]
#[command(about = "Conversation strand extraction from a static post corpus", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Optional TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory holding store.json, trees.json, quotes.json
    #[arg(long, global = true, default_value = ".strand/cache")]
    cache_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the snapshot caches from a JSON-lines post file
    Index(IndexArgs),
    /// Render one strand offline (root plus its quoters, no search)
    Render(RenderArgs),
    /// Assemble strands for many roots with bounded concurrency
    Batch(BatchArgs),
}

#[derive(Args)]
struct IndexArgs {
    /// JSON-lines snapshot, one post per line
    snapshot: PathBuf,

    /// Traversal ceiling for reply chains without a conversation id
    #[arg(long)]
    max_depth: Option<usize>,
}

#[derive(Args)]
struct RenderArgs {
    /// Root post id
    post_id: PostId,

    /// Ancestor hops to include (unbounded when omitted)
    #[arg(long)]
    up: Option<usize>,

    /// Descendant hops to include (unbounded when omitted)
    #[arg(long)]
    down: Option<usize>,

    /// Descendant hops when the seed is itself a conversation root
    #[arg(long)]
    from_root: Option<usize>,
}

#[derive(Args)]
struct BatchArgs {
    /// File with one root post id per line
    roots: PathBuf,

    /// Output directory, one JSON file per strand
    #[arg(long, default_value = "strands")]
    out_dir: PathBuf,

    /// Semantic-search endpoint (overrides the config file)
    #[arg(long)]
    search_url: Option<String>,

    /// Concurrent strand workers (overrides the config file)
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = AppConfig::load(cli.config.as_deref())?;
    let cache = CacheDir::new(&cli.cache_dir);

    match cli.command {
        Commands::Index(args) => run_index(args, cache).await,
        Commands::Render(args) => run_render(args, cache).await,
        Commands::Batch(args) => run_batch(args, cache, config).await,
    }
}

fn phase_spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

async fn run_index(args: IndexArgs, cache: CacheDir) -> Result<()> {
    let spinner = phase_spinner("Loading snapshot");
    let mut store = PostStore::load_snapshot(&args.snapshot)
        .await
        .with_context(|| format!("Failed to load snapshot {}", args.snapshot.display()))?;
    spinner.finish_with_message(format!("Loaded {} posts", store.len()));

    let spinner = phase_spinner("Building quote index");
    let quotes = QuoteIndex::build(&store);
    store.apply_quote_counts(&quotes.counts());
    spinner.finish_with_message(format!("Indexed {} quoted posts", quotes.len()));

    let spinner = phase_spinner("Building conversation trees");
    let builder = match args.max_depth {
        Some(depth) => TreeBuilder::with_max_depth(depth),
        None => TreeBuilder::new(),
    };
    let (threaded, orphans): (Vec<_>, Vec<_>) = store
        .iter()
        .partition(|post| post.conversation_id.is_some());
    let mut trees = builder.build_complete(threaded)?;
    for (root_id, tree) in builder.build_incomplete(orphans) {
        // An orphan chain whose root id collides with a known
        // conversation key defers to the complete tree.
        trees.entry(root_id).or_insert(tree);
    }
    spinner.finish_with_message(format!("Built {} trees", trees.len()));

    cache.save(&store, &trees, &quotes).await?;
    log::info!("Cache written to {}", cache.root().display());
    Ok(())
}

/// Depth bounds from the render flags. A root seed is normally its own
/// conversation key, so `--down` must bind it too unless `--from-root`
/// overrides; leaving `from_root` unbounded would expand the whole tree.
fn render_bounds(args: &RenderArgs) -> DepthBounds {
    DepthBounds {
        up: args.up,
        down: args.down,
        from_root: args.from_root.or(args.down),
    }
}

async fn run_render(args: RenderArgs, cache: CacheDir) -> Result<()> {
    let ctx = cache.load_context().await?;
    let bounds = render_bounds(&args);

    let mut seeds = vec![args.post_id];
    seeds.extend_from_slice(ctx.quotes.quoters_of(args.post_id));

    let media = MediaCache::load(cache.media_path()).await?;
    let text = StrandRenderer::new(&ctx.store, &ctx.trees, bounds)
        .with_media(media.as_lookup())
        .render(&seeds);
    println!("{text}");
    Ok(())
}

async fn run_batch(args: BatchArgs, cache: CacheDir, config: AppConfig) -> Result<()> {
    let endpoint = args
        .search_url
        .or(config.search_endpoint.clone())
        .context("No search endpoint: pass --search-url or set search_endpoint in the config")?;
    let workers = args.workers.unwrap_or(config.workers).max(1);

    let ctx = Arc::new(cache.load_context().await?);
    let media = MediaCache::load(cache.media_path()).await?;

    let strand_config = StrandConfig {
        semantic_limit: config.semantic_limit,
        k: config.k,
        threshold: config.threshold,
        exclude_keywords: config.exclude_keywords.clone(),
        ..Default::default()
    };
    let assembler = Arc::new(
        StrandAssembler::new(ctx, Arc::new(HttpSemanticSearch::new(endpoint)))
            .with_media(Arc::new(media))
            .with_config(strand_config),
    );

    tokio::fs::create_dir_all(&args.out_dir).await?;
    let all_roots = read_root_ids(&args.roots).await?;
    let pending = pending_outputs(&all_roots, &args.out_dir).await;
    log::info!("Assembling {} strands with {} workers", pending.len(), workers);

    let progress = ProgressBar::new(pending.len() as u64);
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    for (root_id, out) in pending {
        let assembler = Arc::clone(&assembler);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire()
                .await
                .context("Worker pool closed early")?;
            let strand = assembler.build_strand(root_id).await;
            let seed_ids: Vec<PostId> = strand.seeds.iter().map(|s| s.post_id).collect();
            let record = serde_json::json!({
                "post_id": strand.root_id,
                "seed_ids": seed_ids,
                "text": strand.text,
            });
            tokio::fs::write(&out, serde_json::to_string(&record)?)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            Ok::<PostId, anyhow::Error>(root_id)
        });
    }

    let mut failures = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(_) => progress.inc(1),
            Err(err) => {
                failures += 1;
                progress.inc(1);
                log::error!("Strand failed: {err:#}");
            }
        }
    }
    progress.finish();

    if failures > 0 {
        bail!("{failures} strands failed");
    }
    Ok(())
}

/// Roots still needing a strand: an output file that exists and is
/// non-empty marks its id as done, so an interrupted batch resumes where
/// it stopped. Empty files (a crash mid-write) are retried.
async fn pending_outputs(roots: &[PostId], out_dir: &std::path::Path) -> Vec<(PostId, PathBuf)> {
    let mut pending = Vec::new();
    for root_id in roots {
        let out = out_dir.join(format!("{root_id}.json"));
        match tokio::fs::metadata(&out).await {
            Ok(meta) if meta.len() > 0 => {
                log::debug!("Skipping {}: output exists", root_id);
            }
            _ => pending.push((*root_id, out)),
        }
    }
    pending
}

async fn read_root_ids(path: &std::path::Path) -> Result<Vec<PostId>> {
    let data = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read roots file {}", path.display()))?;
    let mut ids = Vec::new();
    for (number, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let id: PostId = line
            .parse()
            .with_context(|| format!("Bad post id on line {}: {line:?}", number + 1))?;
        ids.push(id);
    }
    Ok(ids)
}
