use cloudcfg_api::{ApiServer, AppState};
use cloudcfg_config::{AppConfig, LoggingConfig};
use cloudcfg_store::ConfigStore;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cloudcfg")]
#[command(about = "Cloud Configuration System", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the config API server
    Start {
        /// Path to configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: String,
    },

    /// Validate configuration and check that storage can be opened
    Validate {
        /// Path to configuration directory
        #[arg(short, long, default_value = "config")]
        config_dir: String,
    },
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    // RUST_LOG wins over the configured level when set
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
    } else {
        builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { config_dir } => {
            // Load app config from files and environment variables
            let app_config = AppConfig::load(&config_dir)?;
            init_tracing(&app_config.logging)?;

            info!("Starting cloudcfg with config directory: {}", config_dir);

            let store = ConfigStore::open(&app_config.storage).await?;
            let count = store.count().await?;
            info!(backend = store.backend_name(), "Loaded {} config(s)", count);

            let state = AppState::new(store);
            let api_config = app_config.api.clone();
            let server = ApiServer::new(
                api_config.host,
                api_config.port,
                api_config.cors_enabled,
                state,
            );

            info!(
                "API server available at http://{}:{}",
                app_config.api.host, app_config.api.port
            );

            // Wait for API server or shutdown signal
            tokio::select! {
                res = server.run() => {
                    if let Err(e) = res {
                        error!("API server error: {}", e);
                        return Err(e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down cloudcfg...");
                }
            }
        }

        Commands::Validate { config_dir } => {
            let app_config = AppConfig::load(&config_dir)?;
            let store = ConfigStore::open(&app_config.storage).await?;
            let count = store.count().await?;

            println!("✓ Configuration is valid");
            println!(
                "  API: http://{}:{} (CORS {})",
                app_config.api.host,
                app_config.api.port,
                if app_config.api.cors_enabled { "on" } else { "off" }
            );
            println!("  Storage: {}", store.backend_name());
            println!("  Configs: {}", count);
        }
    }

    Ok(())
}
