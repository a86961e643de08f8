use docqa::cli::{Cli, Commands, ConfigAction, QueryMode};
use docqa::config::{Config, ConfigValidator};
use docqa::corpus::ChunkStore;
use docqa::embedding::{EmbedderKey, EmbedderRegistry};
use docqa::error::{DocqaError, Result};
use docqa::retrieval::{
    ContextualRetriever, FusionWeights, HybridRetriever, RebuildOutcome, RetrievalOutcome,
    RetrievalRequest,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Index { chunks } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_index(&config, &chunks)?;
        }
        Commands::Query {
            chunks,
            query,
            k,
            history,
            mode,
            semantic_weight,
            keyword_weight,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            let mut request =
                RetrievalRequest::new(query, k.unwrap_or(config.retrieval.default_k))
                    .with_history(history);
            if semantic_weight.is_some() || keyword_weight.is_some() {
                request = request.with_weights(FusionWeights {
                    semantic: semantic_weight.unwrap_or(config.retrieval.semantic_weight),
                    keyword: keyword_weight.unwrap_or(config.retrieval.keyword_weight),
                });
            }
            cmd_query(&config, &chunks, request, mode, json)?;
        }
        Commands::Stats { chunks, json } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_stats(&config, &chunks, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "docqa=debug" } else { "docqa=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| DocqaError::Io {
        source: e,
        context: "Failed to start async runtime".to_string(),
    })
}

/// Load the corpus and build a retriever over it
async fn build_retriever(config: &Config, chunks: &Path) -> Result<HybridRetriever> {
    let store = ChunkStore::load_jsonl(chunks)?;
    tracing::info!("Loaded {} chunks from {}", store.len(), chunks.display());

    let mut embedding = config.embedding.clone();
    if let Some(dir) = &embedding.cache_dir {
        embedding.cache_dir = Some(expand_path(dir)?);
    }

    let registry = EmbedderRegistry::with_defaults();
    let provider = registry.get_or_create(&EmbedderKey::from_config(&embedding))?;

    let retriever = HybridRetriever::new(config)?;
    if let RebuildOutcome::Rebuilt { vector, lexical } =
        retriever.rebuild(&store, provider).await?
    {
        if !vector || !lexical {
            tracing::warn!(
                "Serving in degraded mode (vector index: {}, lexical index: {})",
                vector,
                lexical
            );
        }
    }

    Ok(retriever)
}

fn cmd_index(config: &Config, chunks: &Path) -> Result<()> {
    runtime()?.block_on(async {
        let retriever = build_retriever(config, chunks).await?;
        let stats = retriever.stats().await;

        println!("✓ Indexed {}", chunks.display());
        if let Some(snapshot) = &stats.snapshot {
            println!("  Snapshot: {}", snapshot.snapshot_id);
            println!("  Chunks:   {}", snapshot.corpus_size);
            println!(
                "  Built:    {}",
                snapshot.built_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        println!("  Vector index:  {}", availability(stats.has_vector));
        println!("  Lexical index: {}", availability(stats.has_lexical));

        Ok(())
    })
}

fn cmd_query(
    config: &Config,
    chunks: &Path,
    request: RetrievalRequest,
    mode: QueryMode,
    json: bool,
) -> Result<()> {
    runtime()?.block_on(async {
        let retriever = Arc::new(build_retriever(config, chunks).await?);

        let outcome = match mode {
            QueryMode::Hybrid => {
                let mut session = ContextualRetriever::new(Arc::clone(&retriever), &config.retrieval);
                session.retrieve(&request).await?
            }
            QueryMode::Vector => {
                retriever
                    .retrieve_vector_only(&request.query, request.k)
                    .await?
            }
            QueryMode::Lexical => {
                retriever
                    .retrieve_lexical_only(&request.query, request.k)
                    .await?
            }
        };

        if json {
            let output = serde_json::to_string_pretty(&outcome).map_err(|e| DocqaError::Json {
                source: e,
                context: "Failed to serialize results".to_string(),
            })?;
            println!("{}", output);
        } else {
            print_outcome(&outcome);
        }

        Ok(())
    })
}

fn print_outcome(outcome: &RetrievalOutcome) {
    if outcome.is_empty() {
        println!("No matching chunks ({})", outcome.mode);
        return;
    }

    println!("{} results ({})", outcome.len(), outcome.mode);
    for result in &outcome.results {
        let citation = result.citation();
        println!();
        println!(
            "{}. {}  score {:.3}  [{}]",
            result.rank, citation, result.score, result.provenance
        );
        println!("   {}", citation.snippet);
    }
}

fn cmd_stats(config: &Config, chunks: &Path, json: bool) -> Result<()> {
    runtime()?.block_on(async {
        let retriever = build_retriever(config, chunks).await?;
        let stats = retriever.stats().await;

        if json {
            let output = serde_json::to_string_pretty(&stats).map_err(|e| DocqaError::Json {
                source: e,
                context: "Failed to serialize stats".to_string(),
            })?;
            println!("{}", output);
            return Ok(());
        }

        match &stats.snapshot {
            Some(snapshot) => {
                println!("Snapshot: {} ({} chunks)", snapshot.short_id(), snapshot.corpus_size)
            }
            None => println!("Snapshot: none"),
        }
        println!("Vector index:  {}", availability(stats.has_vector));
        println!("Lexical index: {}", availability(stats.has_lexical));
        println!(
            "Weights:       semantic {:.2}, keyword {:.2}",
            stats.weights.semantic, stats.weights.keyword
        );
        println!("Default k:     {}", stats.default_k);
        println!("Over-fetch:    {}x", stats.overfetch_factor);

        Ok(())
    })
}

fn cmd_config(config_path: Option<PathBuf>, profile: Option<String>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let mut value = serde_json::to_value(&config).map_err(|e| DocqaError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            if let Some(section) = section {
                value = value
                    .get(&section)
                    .cloned()
                    .ok_or_else(|| DocqaError::Config(format!("Unknown section: {}", section)))?;
            }

            let json = serde_json::to_string_pretty(&value).map_err(|e| DocqaError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'docqa config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    if let Some(profile) = profile {
        Config::load_with_profile(&path, &profile)
    } else {
        Config::load(&path)
    }
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| DocqaError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| DocqaError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}

fn availability(present: bool) -> &'static str {
    if present {
        "ready"
    } else {
        "unavailable"
    }
}
