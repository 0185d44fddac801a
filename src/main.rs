use clap::{Parser, Subcommand};
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

mod agent;
mod config;
mod conversation;
mod models;
mod reporting;
mod server;
mod settings;
mod storage;
mod transcription;

use config::AppConfig;
use storage::{ConversationStore, SqliteConversationStore};

#[derive(Debug, Parser)]
#[command(name = "secops_assistant")]
#[command(about = "Conversational front end for DNS security reporting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the HTTP API.
    Start {
        #[arg(long, default_value = "127.0.0.1:3000")]
        listen: String,
        #[arg(long)]
        database_url: Option<String>,
    },
    /// Print stored turns as JSON.
    Turns {
        #[arg(long)]
        conversation: Option<Uuid>,
        #[arg(long)]
        database_url: Option<String>,
    },
    /// Delete stored turns.
    Purge {
        #[arg(long)]
        conversation: Option<Uuid>,
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    match cli.command {
        Commands::Start { listen, database_url } => {
            let addr: SocketAddr = listen.parse()?;
            let store = SqliteConversationStore::initialize(database_url.or(config.database_url.clone())).await?;
            let state = build_state(&config, store);
            server::serve(addr, state, config.max_audio_bytes).await?;
        }
        Commands::Turns { conversation, database_url } => {
            let store = SqliteConversationStore::initialize(database_url.or(config.database_url)).await?;
            let turns = store.list_turns(conversation).await?;
            println!("{}", serde_json::to_string_pretty(&turns)?);
        }
        Commands::Purge { conversation, database_url } => {
            let store = SqliteConversationStore::initialize(database_url.or(config.database_url)).await?;
            let removed = store.purge_turns(conversation).await?;
            info!(removed, "turns purged");
        }
    }
    Ok(())
}

fn build_state(config: &AppConfig, store: SqliteConversationStore) -> server::AppState {
    let metrics = match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "metrics recorder not installed");
            None
        }
    };
    let tokens = Arc::new(reporting::credentials::TokenCache::new(config.reporting.token_ttl));
    server::AppState {
        store: Arc::new(store),
        model: Arc::new(models::CohereChat::new(&config.chat_model)),
        transcriber: Arc::new(transcription::AssemblyAi::new(config.transcription.clone())),
        reporting: Arc::new(reporting::ReportingClient::new(&config.reporting, tokens)),
        tools: Arc::new(agent::tools::ToolRegistry::with_default_tools()),
        defaults: Arc::new(settings::GlobalDefaults::from_config(config)),
        metrics,
    }
}
