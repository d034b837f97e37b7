use clap::{Parser, Subcommand};
use mockstock_core::ConfigLoader;
use mockstock_settlement::Exchange;
use mockstock_web_api::ApiServer;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mockstock")]
#[command(about = "Settlement core for the mockstock trading simulation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed the engine from config and serve the settlement API
    Serve {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Override the listen address from the config file
        #[arg(short, long)]
        addr: Option<String>,
    },
    /// Load and print the effective configuration, then exit
    CheckConfig {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Serve { config, addr } => {
            run_server(&config, addr.as_deref()).await?;
        }
        Commands::CheckConfig { config } => {
            check_config(&config)?;
        }
    }

    Ok(())
}

async fn run_server(config_path: &str, addr_override: Option<&str>) -> anyhow::Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let addr = match addr_override {
        Some(addr) => addr.to_string(),
        None => format!("{}:{}", config.server.host, config.server.port),
    };

    tracing::info!(
        teams = config.roster.len(),
        max_round = config.session.max_round,
        "seeding settlement engine"
    );
    let exchange = Arc::new(Exchange::new(&config));

    ApiServer::new(exchange).serve(&addr).await
}

fn check_config(config_path: &str) -> anyhow::Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
