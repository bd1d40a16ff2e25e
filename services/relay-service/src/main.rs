//! ephchat Relay Service
//!
//! HTTP front end for the blind relay: accepts ciphertext from
//! authenticated clients, serves conversations within the retention window
//! and streams new messages to online recipients.

use actix_web::{middleware, web, App, HttpServer};
use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ephchat_core::Identity;
use ephchat_relay::{CacheSweeper, HmacTokenVerifier, RelayConfig, RelayService};
use ephchat_store::{ExpirySweeper, StoreBackend};

mod api;
mod error;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "relay-service")]
#[command(about = "ephchat blind relay service")]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind to
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// JSON configuration file; CLI flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage path for the sled backend
    #[arg(short, long)]
    storage_path: Option<String>,

    /// Keep messages in memory only
    #[arg(long)]
    memory: bool,

    /// Run without the read-through cache
    #[arg(long)]
    no_cache: bool,

    /// Secret used to sign and verify bearer tokens
    #[arg(long)]
    token_secret: String,

    /// Print a one-hour token for this identity and exit
    #[arg(long, value_name = "IDENTITY")]
    issue_token: Option<String>,
}

fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let installed = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("Failed to set tracing subscriber")
}

fn load_config(args: &Args) -> anyhow::Result<RelayConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => RelayConfig::default(),
    };

    if let Some(path) = &args.storage_path {
        config.store.path = path.clone();
    }
    if args.memory {
        config.store.backend = StoreBackend::Memory;
    }
    if args.no_cache {
        config.cache.enabled = false;
    }

    if let Err(e) = config.validate() {
        bail!("Invalid configuration: {}", e);
    }
    Ok(config)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.token_secret.is_empty() {
        bail!("--token-secret must not be empty");
    }
    let verifier = Arc::new(HmacTokenVerifier::new(args.token_secret.as_bytes()));

    if let Some(name) = &args.issue_token {
        let identity = Identity::parse(name)?;
        println!("{}", verifier.issue(&identity, Duration::from_secs(3600)));
        return Ok(());
    }

    init_logging(&args.log_level, args.json_logs)?;
    let config = load_config(&args)?;

    info!("Starting ephchat relay service");
    info!(
        "Store: {:?}, retention {}s, cache {}",
        config.store.backend,
        config.store.retention_secs,
        if config.cache.enabled { "enabled" } else { "disabled" }
    );

    let sweep_interval = config.store.sweep_interval();
    let cache_sweep_interval = config.cache.sweep_interval();
    let relay = RelayService::open(config, verifier).context("Failed to open relay")?;
    let sweeper = ExpirySweeper::new(Arc::clone(relay.store()), sweep_interval).spawn();
    let cache_sweeper = relay
        .cache()
        .is_enabled()
        .then(|| CacheSweeper::new(relay.cache().clone(), cache_sweep_interval).spawn());
    let relay = web::Data::new(relay);

    info!("Binding to {}:{}", args.host, args.port);

    HttpServer::new(move || {
        App::new()
            .app_data(relay.clone())
            .wrap(middleware::Logger::default())
            .wrap(actix_cors::Cors::permissive())
            .configure(api::configure_routes)
    })
    .bind((args.host.as_str(), args.port))?
    .run()
    .await?;

    sweeper.abort();
    if let Some(cache_sweeper) = cache_sweeper {
        cache_sweeper.abort();
    }
    info!("Relay service stopped");
    Ok(())
}
