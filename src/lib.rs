pub mod config;
pub mod daemon;
pub mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use config::ServiceConfig;
use daemon::{ClientConfig, CommandBackend, ConnectionServer, DaemonClient};

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "asr-daemon",
    version,
    about = "Keeps a speech-to-text model warm behind a local socket"
)]
pub struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override server.host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Override server.port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the daemon until a shutdown request or Ctrl-C
    Serve,
    /// Transcribe an audio file through a running daemon
    Transcribe {
        /// Audio file to transcribe
        file: PathBuf,
    },
    /// Print the daemon's status as JSON
    Health,
    /// Ask a running daemon to stop accepting connections
    Shutdown,
    /// Print the resolved configuration as TOML
    Config,
}

/// Load the config file, environment and flags, then validate.
pub fn resolve_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config = ServiceConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;
    Ok(config)
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = tracing::subscriber::with_default(logging::bootstrap(), || resolve_config(&cli))?;
    let _log_guard = logging::init(&config.log.level, config.log.file.as_deref())?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Transcribe { file } => {
            let audio = std::path::absolute(&file)
                .with_context(|| format!("resolving {}", file.display()))?;
            let text = client_for(&config).transcribe(&audio)?;
            println!("{text}");
            Ok(())
        }
        Commands::Health => {
            let status = client_for(&config).health()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        Commands::Shutdown => {
            client_for(&config).shutdown()?;
            println!("shutdown requested");
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn client_for(config: &ServiceConfig) -> DaemonClient {
    let mut client = ClientConfig::new(config.server.host.clone(), config.server.port);
    client.request_timeout = config.server_options().request_timeout.max(client.request_timeout);
    DaemonClient::new(client)
}

async fn serve(config: ServiceConfig) -> Result<()> {
    let Some(command) = config.model.inference_command.as_deref() else {
        bail!("model.inference_command is not set (or ASR_DAEMON_INFERENCE_COMMAND)");
    };
    let backend = CommandBackend::from_template(command)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        built = option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown"),
        target = option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown"),
        "Starting asr-daemon"
    );

    let server = Arc::new(ConnectionServer::from_config(&config, Arc::new(backend)));
    let listener = server
        .bind()
        .with_context(|| format!("binding {}:{}", config.server.host, config.server.port))?;
    let shutdown = server.shutdown_handle();

    let worker = Arc::clone(&server);
    let mut serving = tokio::task::spawn_blocking(move || worker.serve(listener));

    tokio::select! {
        result = &mut serving => {
            result??;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                shutdown.request_shutdown();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C, serving until shutdown request"),
        }
    }

    serving.await??;
    Ok(())
}
