use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ragdex_core::{ChunkingConfig, Config, Device, EmbeddingProvider as EmbeddingProviderKind, WhitespaceCodec};
use ragdex_db::{ChunkStore, VectorCollection};
use ragdex_embedding::{DefaultProvider, EmbeddingProvider, OllamaProvider, wrap_resilient_arc};
use ragdex_index::{ChunkerConfig, ContextAssembler, DocumentChunker, Indexer, PathFilter, ScoreWeights, SearchOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "ragdex")]
#[command(about = "Local retrieval-augmented indexing, chunking and search over a directory tree")]
struct Cli {
  /// Enable debug logging and full error backtraces
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Index one or more directories
  Index {
    paths: Vec<PathBuf>,
    #[arg(long)]
    persist_dir: Option<PathBuf>,
    #[arg(long)]
    pattern: Option<String>,
    /// Drop and rebuild the collection before indexing
    #[arg(long)]
    force_recreate: bool,
    #[arg(long)]
    chunk_size: Option<usize>,
    #[arg(long)]
    chunk_overlap: Option<usize>,
    #[arg(long)]
    embedding_function: Option<String>,
    #[arg(long)]
    device: Option<String>,
  },
  /// Search the indexed collection
  Search {
    query: String,
    paths: Vec<PathBuf>,
    #[arg(long)]
    persist_dir: Option<PathBuf>,
    #[arg(short = 'n', long, default_value_t = 5)]
    n: usize,
    #[arg(long)]
    max_tokens: Option<usize>,
    #[arg(long, default_value = "summary")]
    format: String,
    #[arg(long, default_value = "none")]
    expand: String,
    /// Emit results as JSON
    #[arg(long)]
    raw: bool,
    /// Include a per-result score explanation
    #[arg(long)]
    explain: bool,
    /// JSON-encoded `ScoreWeights`, e.g. `{"recency_boost":0.1}`
    #[arg(long)]
    weights: Option<String>,
    /// Glob(s) narrowing results to matching source paths, repeatable
    #[arg(long)]
    filter: Vec<String>,
  },
  /// Watch a directory and keep the index in sync
  Watch {
    dir: PathBuf,
    #[arg(long)]
    persist_dir: Option<PathBuf>,
    #[arg(long)]
    pattern: Option<String>,
    #[arg(long)]
    ignore_patterns: Vec<String>,
  },
  /// Print collection statistics
  Status {
    #[arg(long)]
    persist_dir: Option<PathBuf>,
  },
  /// Drop all stored chunks
  Clean {
    #[arg(long)]
    persist_dir: Option<PathBuf>,
    #[arg(long)]
    force: bool,
  },
  /// Micro-benchmarks against a scratch collection
  Benchmark {
    #[command(subcommand)]
    kind: BenchmarkKind,
    #[arg(long)]
    persist_dir: Option<PathBuf>,
  },
}

#[derive(Subcommand)]
enum BenchmarkKind {
  Indexing { path: PathBuf },
  Search { query: String, #[arg(short = 'n', long, default_value_t = 5)] n: usize },
  WatchPerf { dir: PathBuf },
}

fn init_cli_logging(verbose: bool) {
  let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
  let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());
  tracing_subscriber::registry()
    .with(env_filter)
    .with(tracing_subscriber::fmt::layer())
    .init();
}

/// Long-running `watch` also logs to a daily-rolling file under `log_dir`,
/// since its stdout is rarely attended once the process is backgrounded.
fn init_watch_logging(verbose: bool, log_dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
  std::fs::create_dir_all(log_dir).context("creating log directory")?;
  let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
  let env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());
  let file_appender = tracing_appender::rolling::daily(log_dir, "ragdex-watch.log");
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
  tracing_subscriber::registry()
    .with(env_filter)
    .with(tracing_subscriber::fmt::layer())
    .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
    .init();
  Ok(guard)
}

fn build_embedder(config: &Config, name_override: Option<&str>) -> Arc<dyn EmbeddingProvider> {
  let provider_kind = match name_override {
    Some("ollama") => EmbeddingProviderKind::Ollama,
    Some("default") => EmbeddingProviderKind::Default,
    _ => config.embedding.provider,
  };

  match provider_kind {
    EmbeddingProviderKind::Ollama => {
      let provider = OllamaProvider::new()
        .with_url(config.embedding.ollama_url.clone())
        .with_model(config.embedding.model.clone(), config.embedding.dimensions);
      wrap_resilient_arc(provider)
    }
    EmbeddingProviderKind::Default => {
      let provider = DefaultProvider::with_dimensions(config.embedding.dimensions);
      Arc::new(provider) as Arc<dyn EmbeddingProvider>
    }
  }
}

fn build_chunker(config: &ChunkingConfig, chunk_size: Option<usize>, chunk_overlap: Option<usize>) -> Result<DocumentChunker> {
  let chunker_config = ChunkerConfig {
    chunk_size: chunk_size.unwrap_or(config.chunk_size),
    chunk_overlap: chunk_overlap.unwrap_or(config.chunk_overlap),
    max_chunks: config.max_chunks,
  };
  DocumentChunker::new(Arc::new(WhitespaceCodec), chunker_config).context("building chunker")
}

async fn open_indexer(
  config: &Config,
  persist_dir: &Path,
  embedding_function: Option<&str>,
  chunk_size: Option<usize>,
  chunk_overlap: Option<usize>,
  force_recreate: bool,
) -> Result<Indexer> {
  let embedder = build_embedder(config, embedding_function);
  let chunker = build_chunker(&config.chunking, chunk_size, chunk_overlap)?;
  let store = ChunkStore::open_at_path(persist_dir.join("lancedb"), embedder.dimensions())
    .await
    .context("opening vector store")?;
  if force_recreate {
    info!("dropping existing collection before indexing");
    VectorCollection::reset(&store).await.context("resetting collection")?;
  }
  Ok(Indexer::new(Arc::new(store), embedder, chunker))
}

fn path_filter(config: &Config, pattern: Option<&str>, extra_ignores: &[String]) -> Result<PathFilter> {
  let pattern = pattern.unwrap_or(&config.index.pattern);
  let mut ignores = config.index.ignore_patterns.clone();
  ignores.extend(extra_ignores.iter().cloned());
  PathFilter::new(pattern, &ignores).context("building path filter")
}

fn resolve_device(device: Option<&str>) -> Result<Device> {
  match device {
    None => Ok(Device::Cpu),
    Some("cpu") => Ok(Device::Cpu),
    Some("cuda") => Ok(Device::Cuda),
    Some(other) => bail!("unknown device {other:?}, expected \"cpu\" or \"cuda\""),
  }
}

async fn cmd_index(
  paths: Vec<PathBuf>,
  persist_dir: Option<PathBuf>,
  pattern: Option<String>,
  force_recreate: bool,
  chunk_size: Option<usize>,
  chunk_overlap: Option<usize>,
  embedding_function: Option<String>,
  device: Option<String>,
) -> Result<()> {
  let project = std::env::current_dir()?;
  let mut config = Config::load_for_project(&project);
  config.embedding.device = resolve_device(device.as_deref())?;
  if let Some(dir) = &persist_dir {
    config.persist_dir = Some(dir.clone());
  }
  let persist_dir = config.persist_dir();

  let indexer = open_indexer(&config, &persist_dir, embedding_function.as_deref(), chunk_size, chunk_overlap, force_recreate).await?;
  let filter = path_filter(&config, pattern.as_deref(), &[])?;

  let paths = if paths.is_empty() { vec![project.clone()] } else { paths };
  let mut total = ragdex_index::IndexStats::default();
  for path in &paths {
    let stats = indexer.index_directory(path, &filter).await.with_context(|| format!("indexing {}", path.display()))?;
    total.files_indexed += stats.files_indexed;
    total.files_skipped += stats.files_skipped;
    total.chunks_added += stats.chunks_added;
  }

  println!(
    "indexed {} file(s), skipped {} unchanged, {} chunk(s) added",
    total.files_indexed, total.files_skipped, total.chunks_added
  );
  Ok(())
}

async fn cmd_search(
  query: String,
  paths: Vec<PathBuf>,
  persist_dir: Option<PathBuf>,
  n: usize,
  max_tokens: Option<usize>,
  format: String,
  expand: String,
  raw: bool,
  explain: bool,
  weights: Option<String>,
  filter: Vec<String>,
) -> Result<()> {
  let project = std::env::current_dir()?;
  let mut config = Config::load_for_project(&project);
  if let Some(dir) = &persist_dir {
    config.persist_dir = Some(dir.clone());
  }
  let persist_dir = config.persist_dir();

  let indexer = open_indexer(&config, &persist_dir, None, None, None, false).await?;

  let weights = weights
    .map(|raw| serde_json::from_str::<ScoreWeights>(&raw).context("parsing --weights as JSON"))
    .transpose()?;

  let options = SearchOptions {
    group_chunks: true,
    paths,
    path_filters: filter,
    weights,
    explain,
  };

  let results = indexer.search(&query, n, &options).await.context("searching")?;

  if raw {
    let payload: Vec<serde_json::Value> = results
      .chunks
      .iter()
      .zip(results.distances.iter())
      .map(|(chunk, distance)| {
        serde_json::json!({
          "source": chunk.metadata.source,
          "chunk_index": chunk.metadata.chunk_index,
          "distance": distance,
          "content": chunk.content,
        })
      })
      .collect();
    println!("{}", serde_json::to_string_pretty(&payload)?);
    return Ok(());
  }

  if results.chunks.is_empty() {
    println!("no results");
    return Ok(());
  }

  for (i, (chunk, distance)) in results.chunks.iter().zip(results.distances.iter()).enumerate() {
    println!("{}. {} (distance {:.4})", i + 1, chunk.metadata.source, distance);
    let body = match expand.as_str() {
      "adjacent" => {
        let mut siblings = indexer.adjacent_chunks(chunk).await.context("fetching adjacent chunks")?;
        ragdex_index::merge_chunks(&mut siblings)
      }
      "file" => match std::fs::read_to_string(Path::new(chunk.base_id())) {
        Ok(live) if live.contains(&chunk.content) => live,
        _ => {
          let doc = indexer.reconstruct_document(chunk.base_id()).await.context("reconstructing document")?;
          doc.content
        }
      },
      _ => chunk.content.clone(),
    };

    match format.as_str() {
      "full" => println!("{body}\n"),
      _ => {
        let summary: String = body.lines().take(3).collect::<Vec<_>>().join(" ");
        println!("{summary}\n");
      }
    }

    if explain {
      if let Some(explanations) = &results.explanations {
        if let Some(text) = explanations.get(i) {
          println!("  ({text})");
        }
      }
    }
  }

  if let Some(max_tokens) = max_tokens {
    let assembler = ContextAssembler::new(Arc::new(WhitespaceCodec), max_tokens);
    let assembled = assembler.assemble(&results.chunks, None, Some(&query));
    println!(
      "--- assembled context: {} document(s), {} token(s){} ---",
      assembled.documents_included,
      assembled.total_tokens,
      if assembled.truncated { ", truncated" } else { "" }
    );
    println!("{}", assembled.content);
  }

  Ok(())
}

async fn cmd_watch(dir: PathBuf, persist_dir: Option<PathBuf>, pattern: Option<String>, ignore_patterns: Vec<String>) -> Result<()> {
  let project = std::env::current_dir()?;
  let mut config = Config::load_for_project(&project);
  if let Some(dir) = &persist_dir {
    config.persist_dir = Some(dir.clone());
  }
  let persist_dir = config.persist_dir();

  let coordinator = ragdex_index::WatcherCoordinator::new(&persist_dir);
  let project_id = dir.to_string_lossy().to_string();
  if !coordinator.try_acquire(&project_id, &dir)? {
    bail!("a watcher is already running for {}", dir.display());
  }

  let indexer = open_indexer(&config, &persist_dir, None, None, None, false).await?;
  let filter = path_filter(&config, pattern.as_deref(), &ignore_patterns)?;

  info!("initial sync before watching {}", dir.display());
  indexer.index_directory(&dir, &filter).await.context("initial sync")?;

  // Seed path -> stored base_id from the files the initial sync admitted, so
  // a later Deleted event (whose path no longer exists) can delete by the id
  // the document was actually stored under rather than recomputing a
  // canonical key from a path that's already gone.
  let mut known_sources: HashMap<PathBuf, String> = HashMap::new();
  let scan = ragdex_index::Scanner::new().with_filter(filter.clone()).scan(&dir, |_| {});
  for file in scan.files {
    if let Ok(base) = ragdex_core::base_id(&file.path) {
      known_sources.insert(file.path, base);
    }
  }

  let debounce = ragdex_index::DebounceConfig {
    file_debounce_ms: config.index.watcher_debounce_ms,
    ..Default::default()
  };
  let mut watcher = ragdex_index::DebouncedWatcher::new(&dir, debounce).context("starting file watcher")?;
  let mut indexed_files = 0u32;
  let verify_retries = config.index.verify_retries;
  let verify_delay = Duration::from_millis(config.index.verify_delay_ms);

  println!("watching {} (Ctrl-C to stop)", dir.display());
  loop {
    std::thread::sleep(Duration::from_millis(config.index.watcher_settle_ms));
    let changes = watcher.collect_ready();
    if changes.is_empty() {
      coordinator.update_activity(&dir, indexed_files).ok();
      continue;
    }

    for change in changes {
      if !filter.admits(&change.path) {
        continue;
      }
      match change.kind {
        ragdex_index::ChangeKind::Deleted => {
          if let Some(base) = known_sources.remove(&change.path) {
            indexer.delete_document(&base).await.ok();
          }
        }
        _ => {
          // A modified file's chunk count may have changed, so the prior
          // version must be deleted before the new chunks are added, even
          // though a brand-new file has nothing to delete.
          if let Ok(base) = ragdex_core::base_id(&change.path) {
            indexer.delete_document(&base).await.ok();
          }

          match ragdex_index::DocumentSource::from_file(&change.path, indexer.chunker()) {
            Ok(chunks) if !chunks.is_empty() => {
              let base = chunks[0].metadata.source.clone();
              indexer.add_documents(chunks, 100).await.ok();
              known_sources.insert(change.path.clone(), base);
              indexed_files += 1;

              match indexer.verify_document(&change.path, None, verify_retries, verify_delay).await {
                Ok(true) => {}
                Ok(false) => warn!("verification failed for {}", change.path.display()),
                Err(e) => warn!("verification error for {}: {e}", change.path.display()),
              }
            }
            Ok(_) => {}
            Err(e) => warn!("failed to read {}: {e}", change.path.display()),
          }
        }
      }
    }
    coordinator.update_activity(&dir, indexed_files).ok();
  }
}

async fn cmd_status(persist_dir: Option<PathBuf>) -> Result<()> {
  let project = std::env::current_dir()?;
  let mut config = Config::load_for_project(&project);
  if let Some(dir) = &persist_dir {
    config.persist_dir = Some(dir.clone());
  }
  let persist_dir = config.persist_dir();

  let indexer = open_indexer(&config, &persist_dir, None, None, None, false).await?;
  let status = indexer.get_status().await.context("fetching status")?;

  println!("persist dir: {}", persist_dir.display());
  println!("chunks: {}", status.chunk_count);
  println!("distinct sources: {}", status.distinct_sources);
  println!("chunk size / overlap: {} / {}", status.chunk_size, status.chunk_overlap);
  println!("embedding model: {}", status.embedding_model);
  let mut extensions: Vec<(&String, &usize)> = status.extension_histogram.iter().collect();
  extensions.sort_by(|a, b| b.1.cmp(a.1));
  for (ext, count) in extensions {
    println!("  .{ext}: {count}");
  }
  Ok(())
}

async fn cmd_clean(persist_dir: Option<PathBuf>, force: bool) -> Result<()> {
  if !force {
    bail!("refusing to delete the collection without --force");
  }
  let project = std::env::current_dir()?;
  let mut config = Config::load_for_project(&project);
  if let Some(dir) = &persist_dir {
    config.persist_dir = Some(dir.clone());
  }
  let persist_dir = config.persist_dir();

  let embedder = build_embedder(&config, None);
  let store = ChunkStore::open_at_path(persist_dir.join("lancedb"), embedder.dimensions())
    .await
    .context("opening vector store")?;
  VectorCollection::reset(&store).await.context("resetting collection")?;
  println!("collection reset");
  Ok(())
}

async fn cmd_benchmark(kind: BenchmarkKind, persist_dir: Option<PathBuf>) -> Result<()> {
  let project = std::env::current_dir()?;
  let mut config = Config::load_for_project(&project);
  if let Some(dir) = &persist_dir {
    config.persist_dir = Some(dir.clone());
  }
  let persist_dir = config.persist_dir();

  match kind {
    BenchmarkKind::Indexing { path } => {
      let indexer = open_indexer(&config, &persist_dir, None, None, None, false).await?;
      let filter = path_filter(&config, None, &[])?;
      let start = Instant::now();
      let stats = indexer.index_directory(&path, &filter).await.context("indexing")?;
      println!(
        "indexed {} file(s), {} chunk(s) in {:?}",
        stats.files_indexed,
        stats.chunks_added,
        start.elapsed()
      );
    }
    BenchmarkKind::Search { query, n } => {
      let indexer = open_indexer(&config, &persist_dir, None, None, None, false).await?;
      let start = Instant::now();
      let results = indexer.search(&query, n, &SearchOptions::default()).await.context("searching")?;
      println!("{} result(s) in {:?}", results.chunks.len(), start.elapsed());
    }
    BenchmarkKind::WatchPerf { dir } => {
      let start = Instant::now();
      let mut watcher = ragdex_index::DebouncedWatcher::with_defaults(&dir).context("starting watcher")?;
      std::thread::sleep(Duration::from_millis(500));
      let changes = watcher.collect_all();
      println!("observed {} pending change(s) in {:?}", changes.len(), start.elapsed());
    }
  }
  Ok(())
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
  let cli = Cli::parse();

  let _watch_log_guard = match &cli.command {
    Commands::Watch { persist_dir, .. } => {
      let log_dir = persist_dir.clone().unwrap_or_else(Config::default_persist_dir).join("logs");
      match init_watch_logging(cli.verbose, &log_dir) {
        Ok(guard) => Some(guard),
        Err(e) => {
          eprintln!("error: {e}");
          return std::process::ExitCode::FAILURE;
        }
      }
    }
    _ => {
      init_cli_logging(cli.verbose);
      None
    }
  };

  let result = match cli.command {
    Commands::Index {
      paths,
      persist_dir,
      pattern,
      force_recreate,
      chunk_size,
      chunk_overlap,
      embedding_function,
      device,
    } => cmd_index(paths, persist_dir, pattern, force_recreate, chunk_size, chunk_overlap, embedding_function, device).await,
    Commands::Search {
      query,
      paths,
      persist_dir,
      n,
      max_tokens,
      format,
      expand,
      raw,
      explain,
      weights,
      filter,
    } => cmd_search(query, paths, persist_dir, n, max_tokens, format, expand, raw, explain, weights, filter).await,
    Commands::Watch { dir, persist_dir, pattern, ignore_patterns } => cmd_watch(dir, persist_dir, pattern, ignore_patterns).await,
    Commands::Status { persist_dir } => cmd_status(persist_dir).await,
    Commands::Clean { persist_dir, force } => cmd_clean(persist_dir, force).await,
    Commands::Benchmark { kind, persist_dir } => cmd_benchmark(kind, persist_dir).await,
  };

  match result {
    Ok(()) => std::process::ExitCode::SUCCESS,
    Err(e) => {
      if cli.verbose {
        eprintln!("error: {e:?}");
      } else {
        eprintln!("error: {e}");
      }
      std::process::ExitCode::FAILURE
    }
  }
}
