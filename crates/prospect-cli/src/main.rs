use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prospect_engine::EnrichmentEngine;
use prospect_provider::{DatasetTriggerClient, ProviderConfig};
use prospect_store::InMemoryStore;
use prospect_web::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "prospect-cli")]
#[command(about = "Prospect profile enrichment service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the HTTP service (default command)
    Serve {
        /// Bind host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Bind port
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Print the resolved provider configuration (secrets redacted)
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve {
        host: "127.0.0.1".to_string(),
        port: 8000,
    }) {
        Commands::Serve { host, port } => serve(host, port).await,
        Commands::CheckConfig => check_config(),
    }
}

async fn serve(host: String, port: u16) -> Result<()> {
    let config = ProviderConfig::from_env();
    let provider_name = config.provider_name.clone();
    let provider =
        Arc::new(DatasetTriggerClient::new(config).context("building provider client")?);
    let store = Arc::new(InMemoryStore::new());
    let engine = Arc::new(EnrichmentEngine::new(
        store.clone(),
        store.clone(),
        provider,
    ));
    let state = AppState {
        engine,
        profiles: store.clone(),
        jobs: store,
    };

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("binding {host}:{port}"))?;
    info!(%host, port, provider = %provider_name, "prospect enrichment service ready");
    axum::serve(listener, prospect_web::app(state))
        .await
        .context("serving http")?;
    Ok(())
}

fn check_config() -> Result<()> {
    let config = ProviderConfig::from_env();
    println!("provider:     {}", config.provider_name);
    println!("base_url:     {}", config.base_url);
    println!("auth_scheme:  {}", config.auth_scheme);
    println!(
        "api_key:      {}",
        if config.api_key.is_some() { "set" } else { "missing" }
    );
    println!(
        "dataset_id:   {}",
        config.dataset_id.as_deref().unwrap_or("missing")
    );
    println!(
        "trigger_url:  {}",
        config.trigger_url.as_deref().unwrap_or("(default path)")
    );
    Ok(())
}
