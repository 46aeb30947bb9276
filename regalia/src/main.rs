//! # regaliad
//!
//! Standalone Regalia daemon. Serves display customizations from a directory
//! of JSON records, with tiers taken from the config file's `static_tiers`.
//!
//! - `SIGHUP` reloads the configuration and drops every cache
//! - `SIGINT`/`SIGTERM` drain pending saves and exit

use anyhow::Result;
use clap::Parser;
use regalia::{load_config, JsonFileStore, RegaliaContext, StaticPermissions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Regalia - identity display customization daemon
#[derive(Parser, Debug)]
#[command(name = "regaliad", version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "/grimoire/system/regalia.yaml")]
    config: PathBuf,

    /// Directory holding one JSON record per identity
    #[arg(long, default_value = "/var/lib/regalia")]
    data_dir: PathBuf,

    /// Print the composed display for an identity and exit
    #[arg(long)]
    compose: Option<Uuid>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .init();

    let config = load_config(&args.config)?;
    info!("Loaded configuration from {:?}", args.config);

    let store = Arc::new(JsonFileStore::new(&args.data_dir));
    store.init().await?;
    info!("Record directory: {:?}", args.data_dir);

    let permissions = Arc::new(StaticPermissions::new(
        config.static_tiers.clone(),
        &config.tiers.default_tier,
    ));
    let ctx = Arc::new(RegaliaContext::new(config, store, permissions)?);

    // One-shot mode
    if let Some(id) = args.compose {
        println!("{}", ctx.composer().compose_display(id).await);
        ctx.shutdown().await;
        return Ok(());
    }

    ctx.presence().register(Arc::new(|id: Uuid, composed: &str| {
        info!("Display changed for {}: {}", id, composed);
    }));
    ctx.spawn_maintenance().await;

    info!("Regalia daemon v{} ready", env!("CARGO_PKG_VERSION"));
    run_until_shutdown(&ctx, &args.config).await?;

    ctx.shutdown().await;
    info!("Regalia daemon stopped");
    Ok(())
}

#[cfg(unix)]
async fn run_until_shutdown(ctx: &RegaliaContext, config_path: &Path) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, initiating shutdown");
                break;
            }

            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating shutdown");
                break;
            }

            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading {:?}", config_path);
                match load_config(config_path) {
                    Ok(config) => {
                        if let Err(e) = ctx.reload(config).await {
                            error!("Reload rejected: {}", e);
                        }
                    }
                    Err(e) => error!("Failed to read configuration: {}", e),
                }
            }
        }
    }

    Ok(())
}

#[cfg(not(unix))]
async fn run_until_shutdown(_ctx: &RegaliaContext, _config_path: &Path) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received interrupt, initiating shutdown");
    Ok(())
}
