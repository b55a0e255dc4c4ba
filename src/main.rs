use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vaultrag::cli::{Cli, Commands, ConfigAction};
use vaultrag::config::Config;
use vaultrag::embedding::LocalEmbedder;
use vaultrag::error::{Result, VaultragError};
use vaultrag::index::{CancelToken, IndexEngine, IndexOptions, IndexProgress};
use vaultrag::source::FsVaultSource;
use vaultrag::store::{QueryConfig, VectorStore};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Index { full } => {
            cmd_index(cli.config, full).await?;
        }
        Commands::Query {
            text,
            limit,
            min_similarity,
            json,
            context,
        } => {
            cmd_query(cli.config, &text, limit, min_similarity, json, context).await?;
        }
        Commands::Status => {
            cmd_status(cli.config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vaultrag=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

/// Build the engine with its production collaborators
fn build_engine(config: Config) -> Result<IndexEngine> {
    let vault_root = expand_path(&config.vault.root)?;
    let data_dir = expand_path(&config.storage.data_dir)?;

    let source = Arc::new(FsVaultSource::new(
        vault_root,
        config.vault.extensions.clone(),
    ));

    let client =
        Arc::new(
            LocalEmbedder::new(&config.embedding.model).map_err(|source| {
                VaultragError::Embedding {
                    document: None,
                    source,
                }
            })?,
        );

    let store = Arc::new(VectorStore::open(&data_dir.join("index.sqlite"))?);

    IndexEngine::new(source, client, store, config)
}

async fn cmd_index(config_path: Option<PathBuf>, full: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = build_engine(config)?;

    // Ctrl-C cancels cooperatively: committed documents stay indexed
    let cancel = CancelToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling after the current batch...");
            signal_cancel.cancel();
        }
    });

    let stats = engine
        .update_index(
            IndexOptions { reindex_all: full },
            render_progress,
            &cancel,
        )
        .await?;

    println!();
    if stats.cancelled {
        println!("⚠ Index update cancelled");
    } else {
        println!("✓ Index up to date");
    }
    println!("  Documents scanned: {}", stats.documents_scanned);
    println!("  Documents updated: {}", stats.documents_changed);
    println!("  Documents removed: {}", stats.documents_removed);
    if stats.documents_failed > 0 {
        println!("  Documents skipped (read errors): {}", stats.documents_failed);
    }
    println!(
        "  Chunks embedded: {} ({} cache hits, {:.0}% hit rate)",
        stats.chunks_embedded,
        stats.cache_hits,
        stats.cache_hit_rate() * 100.0
    );
    println!("  Took {}ms", stats.duration_ms);

    Ok(())
}

fn render_progress(progress: IndexProgress) {
    if progress.total_chunks == 0 {
        return;
    }
    if progress.waiting_for_rate_limit {
        print!(
            "\r  {}/{} chunks (waiting for rate limit...)",
            progress.completed_chunks, progress.total_chunks
        );
    } else {
        print!(
            "\r  {}/{} chunks                             ",
            progress.completed_chunks, progress.total_chunks
        );
    }
    std::io::stdout().flush().ok();
}

async fn cmd_query(
    config_path: Option<PathBuf>,
    text: &str,
    limit: Option<usize>,
    min_similarity: Option<f32>,
    json: bool,
    context: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let engine = build_engine(config)?;

    let mut query_config: QueryConfig = engine.default_query_config();
    if let Some(limit) = limit {
        query_config.limit = limit;
    }
    if let Some(min_similarity) = min_similarity {
        query_config.min_similarity = min_similarity;
    }

    let results = engine.query_text(text, Some(query_config)).await?;

    if context {
        println!("{}", engine.assemble_context(&results));
        return Ok(());
    }

    if json {
        let out = serde_json::to_string_pretty(&results).map_err(|e| VaultragError::Json {
            source: e,
            context: "Failed to serialize query results".to_string(),
        })?;
        println!("{}", out);
        return Ok(());
    }

    if results.is_empty() {
        println!("No matching chunks");
        return Ok(());
    }

    for result in results {
        println!(
            "{:.3}  {}  [{}..{}]",
            result.similarity,
            result.chunk.document_path,
            result.chunk.start_offset,
            result.chunk.end_offset
        );
        for line in result.chunk.text.lines().take(3) {
            println!("       {}", line);
        }
        println!();
    }

    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let data_dir = expand_path(&config.storage.data_dir)?;

    let store = VectorStore::open(&data_dir.join("index.sqlite"))?;
    let stats = store.stats()?;
    let state = store.indexed_state(&config.embedding.model)?;

    println!("Vaultrag Status");
    println!("===============");
    println!("\nVault: {}", config.vault.root.display());
    println!("Model: {}", config.embedding.model);
    println!("\nIndexed documents (current model): {}", state.len());
    println!("Documents (all models): {}", stats.document_count);
    println!("Chunks: {}", stats.chunk_count);
    println!("Embeddings: {}", stats.embedding_count);

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| VaultragError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = file.unwrap_or(Config::default_path()?);
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = Config::default_path()?;

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| VaultragError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'vaultrag config init' to create one."
        );
        return Ok(Config::default());
    }

    Config::load(&path)
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| VaultragError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| VaultragError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
