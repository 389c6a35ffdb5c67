//! HarborKV Server Binary
//!
//! Starts the TCP server for HarborKV.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use harborkv::replication::SlaveOfTarget;
use harborkv::{Config, Server, ServerContext};
use tracing_subscriber::{fmt, EnvFilter};

/// HarborKV Server
#[derive(Parser, Debug)]
#[command(name = "harborkv-server")]
#[command(about = "Control plane node for a replicated, Redis-compatible key-value store")]
#[command(version)]
struct Args {
    /// Configuration file (also the target of CONFIG REWRITE)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen addresses, overriding the config file
    #[arg(short, long, num_args = 1..)]
    bind: Vec<String>,

    /// Listen port, overriding the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Data directory for backups, overriding the config file
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Global password, overriding the config file
    #[arg(long)]
    requirepass: Option<String>,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,harborkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("HarborKV Server v{}", harborkv::VERSION);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };
    let slaveof = config.slaveof.clone();
    tracing::info!("Data directory: {}", config.data_dir.display());

    let ctx = match ServerContext::builder(config).build() {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!("Failed to initialize: {}", e);
            process::exit(1);
        }
    };

    let server = match Server::bind(ctx) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to bind: {}", e);
            process::exit(1);
        }
    };

    // Follow the configured master once the real port is known
    if let Some((host, port)) = slaveof {
        let ctx = server.context();
        let target = SlaveOfTarget::Master { host, port };
        if let Err(e) = ctx.replication().slave_of(&target, &ctx.topology()) {
            tracing::error!("Failed to attach to the configured master: {}", e);
        }
    }

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        process::exit(1);
    }

    tracing::info!("Server stopped");
}

fn load_config(args: &Args) -> harborkv::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    if !args.bind.is_empty() {
        config.binds = args.bind.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = &args.dir {
        config.data_dir = dir.clone();
    }
    if let Some(password) = &args.requirepass {
        config.requirepass = password.clone();
    }
    Ok(config)
}
