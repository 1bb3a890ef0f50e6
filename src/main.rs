//! Snooze - AI coding assistant discussion tracker.
//!
//! Binary entry point: web server, one-shot analysis, crawling and cache
//! maintenance.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use analysis_pipeline::{AnalysisCoordinator, AnalysisEvent, FnSink};
use anyhow::{Context, Result};
use cache_store::{CacheNamespace, CacheStore};
use clap::{Args, Parser, Subcommand};
use llm_interface::{build_provider, LlmSummarizer};
use reddit_client::{FetchQuery, PostFetcher, RedditFetcher};
use snooze_core::{AnalyzeRequest, AppConfig, ErrorReporter, RetryPolicy, DEFAULT_LIMIT};
use web_server::AppState;

/// Snooze - summarize what developers say about AI coding assistants.
#[derive(Parser, Debug)]
#[command(name = "snooze", version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, env = "SNOOZE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web server.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one analysis and print the discussion summary as JSON.
    Analyze {
        #[command(flatten)]
        query: QueryArgs,
        /// Ignore cached posts and summaries.
        #[arg(long)]
        force: bool,
        /// Write the result to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fetch relevant posts and print them as JSON, without summarizing.
    Crawl {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Inspect or clear the result cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Communities to read; defaults to the configured list.
    #[arg(long, num_args = 1..)]
    subreddits: Vec<String>,
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    limit: usize,
    #[arg(long)]
    search: Option<String>,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    Stats,
    Clear {
        /// posts, summaries or discussions
        #[arg(long)]
        category: Option<String>,
        /// Only delete entries older than this many days.
        #[arg(long)]
        max_age_days: Option<u64>,
    },
}

impl QueryArgs {
    fn into_request(self, config: &AppConfig) -> AnalyzeRequest {
        let subreddits = if self.subreddits.is_empty() {
            config.reddit.default_subreddits.clone()
        } else {
            self.subreddits
        };
        let request = AnalyzeRequest::new(subreddits, self.limit);
        match self.search {
            Some(search) => request.with_search(search),
            None => request,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "snooze=info,web_server=info,analysis_pipeline=info,reddit_client=info,\
                 llm_interface=info,cache_store=info"
                    .into()
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Analyze {
            query,
            force,
            output,
        } => {
            let request = query.into_request(&config).with_force_refresh(force);
            analyze(config, request, output).await
        }
        Commands::Crawl { query } => {
            let request = query.into_request(&config);
            crawl(config, request).await
        }
        Commands::Cache { command } => cache(config, command).await,
    }
}

async fn open_cache(config: &AppConfig) -> Result<CacheStore> {
    CacheStore::open(&config.cache.database_url)
        .await
        .with_context(|| format!("failed to open cache at {}", config.cache.database_url))
}

async fn build_coordinator(config: &AppConfig) -> Result<AnalysisCoordinator> {
    config.require_llm().context("LLM is not configured")?;

    let fetcher = RedditFetcher::from_config(&config.reddit).context("Reddit client setup failed")?;
    let provider = build_provider(&config.llm).context("LLM provider setup failed")?;
    let summarizer = LlmSummarizer::new(provider)
        .with_retry_policy(RetryPolicy::default().with_max_retries(config.llm.max_retries));
    let cache = open_cache(config).await?;

    Ok(AnalysisCoordinator::from_config(
        Arc::new(fetcher),
        Arc::new(summarizer),
        cache,
        config,
    ))
}

async fn serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let coordinator = build_coordinator(&config).await?;
    let state = AppState::new(Arc::new(coordinator), config.server.event_buffer);

    tracing::info!("Starting Snooze web server");
    web_server::start_server(&config.server, state).await?;
    Ok(())
}

async fn analyze(config: AppConfig, request: AnalyzeRequest, output: Option<PathBuf>) -> Result<()> {
    let coordinator = build_coordinator(&config).await?;
    let request_id = uuid::Uuid::new_v4().to_string();

    let sink = FnSink(|event: AnalysisEvent| {
        match &event {
            AnalysisEvent::Progress { message, .. } => eprintln!("{message}"),
            AnalysisEvent::PostSummaryReady { summary } => {
                eprintln!("  [{}] {}", summary.sentiment, summary.title)
            }
            _ => {}
        }
        true
    });

    let outcome = match coordinator.run(&request_id, &request, &sink).await {
        Ok(outcome) => outcome,
        Err(e) => anyhow::bail!(ErrorReporter::new().report(&e)),
    };
    tracing::info!(
        fetched = outcome.fetched_count,
        cached = outcome.cached_count,
        fresh = outcome.fresh_count,
        failed = outcome.failed_count,
        "Analysis finished"
    );

    let json = serde_json::to_string_pretty(&outcome.discussion)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Discussion summary written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn crawl(config: AppConfig, request: AnalyzeRequest) -> Result<()> {
    request.validate()?;
    let fetcher = RedditFetcher::from_config(&config.reddit).context("Reddit client setup failed")?;
    let posts = fetcher.fetch_posts(&FetchQuery::from(&request)).await?;

    eprintln!("Fetched {} relevant posts", posts.len());
    println!("{}", serde_json::to_string_pretty(&posts)?);
    Ok(())
}

async fn cache(config: AppConfig, command: CacheCommand) -> Result<()> {
    let cache = open_cache(&config).await?;

    match command {
        CacheCommand::Stats => {
            let stats = cache.stats().await?;
            for namespace in &stats.namespaces {
                println!(
                    "{:<14} {:>6} entries {:>10} bytes",
                    namespace.namespace, namespace.entry_count, namespace.payload_bytes
                );
            }
            println!("{:<14} {:>6} entries", "total", stats.total_entries());
        }
        CacheCommand::Clear {
            category,
            max_age_days,
        } => {
            let namespace = category.as_deref().map(CacheNamespace::parse).transpose()?;
            let older_than = max_age_days.map(|days| Duration::from_secs(days.saturating_mul(24 * 3600)));
            let deleted = cache.clear(namespace, older_than).await?;
            println!("Deleted {deleted} cached entries");
        }
    }

    cache.close().await;
    Ok(())
}
