use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ratsd::config::RatsdConfig;
use ratsd::mock::MockManager;
use ratsd_plugin::{PluginLoader, PluginManager, SubAttesterManager};

#[derive(Parser)]
#[command(
    name = "ratsd",
    version,
    about = "Compose attestation evidence from sub-attester plugins"
)]
struct Cli {
    /// Path to the TOML configuration (defaults to ./ratsd.toml when present)
    #[arg(long, global = true, env = "RATSD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Load plugins from the plugin directory and serve (default)
    Serve,
    /// Serve canned evidence from a JSON file instead of plugins
    Mock {
        #[arg(long)]
        evidence: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RatsdConfig::load(cli.config.as_deref())?;
    ratsd_logging::init_logging(&config.logging, "ratsd")?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        protocol = ?config.protocol,
        list_options = ?config.list_options,
        "starting ratsd"
    );

    let manager: Arc<dyn PluginManager> = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => Arc::new(load_plugins(&config).await?),
        Command::Mock { evidence } => {
            tracing::info!(evidence = %evidence.display(), "mock mode");
            Arc::new(MockManager::from_file(&evidence)?)
        }
    };

    ratsd::serve(config, manager).await
}

async fn load_plugins(config: &RatsdConfig) -> Result<SubAttesterManager> {
    let mut loader =
        PluginLoader::new(&config.plugin_dir).with_handshake_timeout(config.handshake_timeout());
    if config.secure_loader {
        loader
            .set_checksums(config.plugins.iter())
            .context("invalid plugin checksum table")?;
    }

    let manager = SubAttesterManager::create(loader)
        .await
        .with_context(|| format!("failed to load plugins from {}", config.plugin_dir.display()))?;

    let names = manager.plugin_list();
    if names.is_empty() {
        tracing::warn!(plugin_dir = %config.plugin_dir.display(), "no sub-attesters loaded");
    }
    for name in &names {
        tracing::info!(attester = %name, "sub-attester available");
    }

    Ok(manager)
}
