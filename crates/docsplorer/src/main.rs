//! # Docsplorer CLI
//!
//! ```bash
//! # Serve the HTTP API
//! docsplorer --config ./config/docsplorer.toml serve
//!
//! # One-off search restricted to one file
//! docsplorer search "security fixes" --collection content --filename Notes_RevB --window 1
//!
//! # Filename lookup
//! docsplorer filenames "ecos 9.3" --collection content
//!
//! # Validate configuration and show resolved store endpoints
//! docsplorer check
//! ```
//!
//! Without `--config`, settings are read from environment variables.

use anyhow::Result;
use clap::{Parser, Subcommand};
use docsplorer::config::{self, Config, Environment};
use docsplorer::connection::resolve;
use docsplorer::registry::ClientRegistry;
use docsplorer::server;
use docsplorer::session::{SearchSession, SessionOptions};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "docsplorer",
    about = "Semantic search over page-structured documents in Qdrant",
    version
)]
struct Cli {
    /// Path to a TOML configuration file. Environment variables are used
    /// when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    Serve {
        /// Override `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run a batch search and print the results as JSON.
    Search {
        /// One or more query strings.
        #[arg(required = true)]
        queries: Vec<String>,
        #[arg(long)]
        collection: String,
        /// Restrict to files whose name matches this text.
        #[arg(long)]
        filename: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        /// Pages on each side of a hit.
        #[arg(long)]
        window: Option<u32>,
        #[arg(long)]
        model: Option<String>,
        /// Use the production store.
        #[arg(long)]
        production: bool,
    },

    /// Look up filenames by text match.
    Filenames {
        query: String,
        #[arg(long)]
        collection: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        production: bool,
    },

    /// Validate configuration and print the resolved store endpoints.
    Check,
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(false)).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn load(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => config::load_config(path),
        None => Config::from_env(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let mut cfg = load(&cli)?;
    config::validate_environment(&cfg)?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            server::run_server(&cfg).await?;
        }
        Commands::Search {
            queries,
            collection,
            filename,
            limit,
            window,
            model,
            production,
        } => {
            let registry = ClientRegistry::new(&cfg);
            let options = SessionOptions {
                use_production: production,
                context_window: window,
                ..SessionOptions::default()
            };
            let session = SearchSession::open(&registry, &cfg, &collection, options).await?;
            let filter =
                filename.map(|name| json!({ "metadata.filename": { "match_text": name } }));
            let results = session
                .search(
                    &queries,
                    filter.as_ref(),
                    limit.unwrap_or(cfg.search.default_limit),
                    model.as_deref(),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Filenames {
            query,
            collection,
            limit,
            production,
        } => {
            let registry = ClientRegistry::new(&cfg);
            let options = SessionOptions {
                use_production: production,
                ..SessionOptions::default()
            };
            let session = SearchSession::open(&registry, &cfg, &collection, options).await?;
            let result = session.search_filenames(&query, limit).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Check => {
            info!(environment = %cfg.environment, "configuration loaded");
            for environment in [Environment::Development, Environment::Production] {
                let profile = resolve(None, environment, &cfg.store)?;
                println!(
                    "{:<12} {} (verify_tls: {}, api_key: {})",
                    environment.as_str(),
                    profile.url,
                    profile.verify_tls,
                    if profile.api_key.is_some() { "set" } else { "none" }
                );
            }
            println!("{:<12} {} (model: {})", "embedding", cfg.embedding.url, cfg.embedding.model);
        }
    }

    Ok(())
}
