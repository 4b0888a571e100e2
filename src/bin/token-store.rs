use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use auth_token_store::config::loader::file_to_config;
use auth_token_store::server;
use auth_token_store::sources::build_providers;
use auth_token_store::store::AuthTokenStore;
use auth_token_store::utils::logging;
use auth_token_store::utils::logging::LogLevel;
use clap::Parser;
use reqwest::Client;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "token-store.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, init logging
    // -------------------------------

    let args = Args::parse();
    let service_config = file_to_config(Path::new(&args.config))?;
    logging::run(&service_config, args.log_level);

    // -------------------------------
    // 2. Providers and the store
    // -------------------------------

    let client = Client::new();
    let providers = build_providers(&service_config.providers, &client);
    let store = Arc::new(AuthTokenStore::new(service_config.settings.store.clone()));
    info!("configured providers: {:?}", providers.keys().collect::<Vec<_>>());

    // -------------------------------
    // 3. Serve tokens and metrics until ctrl-c
    // -------------------------------

    info!("Service starting...");
    tokio::select! {
        res = server::start(&service_config.settings, store, providers) => res?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    Ok(())
}
