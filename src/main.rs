//! DeckBridge - operator console for the OBS synchronization core
//!
//! Connects to OBS Studio, prints routed events and lets commands be typed
//! at a prompt.

use anyhow::Result;
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use deckbridge::config::AppConfig;
use deckbridge::transport::WebSocketConnector;
use deckbridge::{Bridge, Health, LifecycleEvent};

/// DeckBridge - keep a live mirror of OBS Studio and drive it from a prompt
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// OBS host (overrides the config file)
    #[arg(long, env = "OBS_HOST")]
    host: Option<String>,

    /// OBS WebSocket port (overrides the config file)
    #[arg(long, env = "OBS_PORT")]
    port: Option<u16>,

    /// OBS WebSocket password (overrides the config file)
    #[arg(long, env = "OBS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let _log_guard = init_logging(&args.log_level, args.json, args.log_dir.as_deref())?;

    info!("Starting DeckBridge v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config.display());

    let mut config = AppConfig::load_or_default(&args.config).await?;
    if let Some(host) = args.host {
        config.obs.host = host;
    }
    if let Some(port) = args.port {
        config.obs.port = port;
    }
    if args.password.is_some() {
        config.obs.password = args.password;
    }
    if let Err(e) = config.obs.validate() {
        warn!("⚠️  Invalid OBS configuration: {:#}", e);
    }

    let bridge = Bridge::from_config(&config.obs, Arc::new(WebSocketConnector));
    print_lifecycle(&bridge);
    print_events(&bridge);

    bridge.start().await;
    run_app(&bridge).await?;

    info!("Shutting down...");
    bridge.stop().await;
    info!("DeckBridge shutdown complete");
    Ok(())
}

async fn run_app(bridge: &Bridge) -> Result<()> {
    let mut lines = cli::spawn_reader()?;
    let mut shutdown = std::pin::pin!(shutdown_signal());

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    break;
                };
                match cli::parse(&line) {
                    Ok(Some(command)) => {
                        if !cli::execute(bridge, command).await {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => println!("{} {}", "✗".red(), e),
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, leaving prompt");
                break;
            }
        }
    }

    Ok(())
}

fn print_lifecycle(bridge: &Bridge) {
    bridge.lifecycle().subscribe_all(|event| match event {
        LifecycleEvent::Connected => println!("{}", "● OBS connected".green().bold()),
        LifecycleEvent::Disconnected { reason } => {
            println!("{} {}", "○ OBS disconnected:".red().bold(), reason)
        },
        LifecycleEvent::StatusChanged(info) => {
            let line = format!("  {} ({})", info.state, info.health);
            match info.health {
                Health::Normal => println!("{}", line.dimmed()),
                Health::Warning => println!("{}", line.yellow()),
                Health::Error => println!("{}", line.red()),
            }
        },
    });
}

fn print_events(bridge: &Bridge) {
    bridge.events().subscribe_all(|event| {
        println!("{} {}", "📥".dimmed(), event.to_string().cyan());
    });
}

fn init_logging(level: &str, json: bool, log_dir: Option<&std::path::Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let console = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
    });
    let console_json = json.then(|| tracing_subscriber::fmt::layer().json().with_target(false));

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "deckbridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(console_json)
        .with(file)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
