//! The `neuron` command-line entry point.

mod config;

use clap::{Parser, Subcommand};
use config::{LogFormat, NeuronConfig};
use neuron_agent::AgentRegistry;
use neuron_core::AgentType;
use neuron_gateway::{ApiKeyAuthenticator, AppState, GatewayServer};
use neuron_orchestrator::{KeywordClassifier, Orchestrator};
use neuron_session::FileMessageStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "neuron", about = "Neuron — multi-agent streaming gateway")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "neuron.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List registered agents and their dependencies
    Agents,
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let (config, loaded) = NeuronConfig::load(&cli.config).await?;
    init_logging(config.logging.format);
    if !loaded {
        warn!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    let registry = Arc::new(AgentRegistry::with_builtins(&config.agents));

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            serve(config, registry, &host, port).await?;
        }
        Commands::Agents => {
            println!("Registered agents:");
            for agent_type in registry.types() {
                let Some(agent) = registry.get(agent_type) else {
                    continue;
                };
                let deps = agent.depends_on();
                if deps.is_empty() {
                    println!("  {agent_type}");
                } else {
                    let deps: Vec<&str> = deps.iter().map(AgentType::as_str).collect();
                    println!("  {agent_type} (after: {})", deps.join(", "));
                }
            }
            println!("\nTotal: {} agent(s)", registry.len());
        }
    }

    Ok(())
}

async fn serve(
    config: NeuronConfig,
    registry: Arc<AgentRegistry>,
    host: &str,
    port: u16,
) -> anyhow::Result<()> {
    info!(host = %host, port, "Starting Neuron gateway");

    let store = Arc::new(FileMessageStore::new(config.data_dir.join("messages")).await?);
    let classifier = Arc::new(KeywordClassifier::new()?);
    let orchestrator = Orchestrator::new(registry, classifier, store, config.orchestrator);

    let authenticator = ApiKeyAuthenticator::new(config.auth.api_keys);
    if authenticator.is_enabled() {
        info!("API key auth enabled");
    }

    let state = AppState::new(orchestrator, Arc::new(authenticator), config.gateway);
    let app = GatewayServer::build(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Neuron gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Neuron gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
