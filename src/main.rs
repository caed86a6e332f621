// PayGate Admission - Main Entry Point
//
// Standalone admission service:
// - CLI interface
// - Configuration loading (TOML + environment)
// - Admission-controlled HTTP router
// - Periodic stale-bucket reclamation

use anyhow::Result;
use clap::Parser;
use paygate_admission::config::{Config, DEFAULT_CONFIG_PATH};
use paygate_admission::metrics;
use paygate_admission::rate_limit::{spawn_reclaimer, RateLimitManager};
use paygate_admission::server;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

/// PayGate Admission: per-tenant quota enforcement for payment APIs
#[derive(Parser, Debug)]
#[command(name = "paygate-admission")]
#[command(author = "PayGate Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Tenant admission control for a payment gateway", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loaded = Config::load_from_path(&args.config);
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default().apply_env_overrides(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_tracing(&config, args.verbose);

    if let Err(e) = loaded {
        warn!("Failed to load configuration: {:#}; using defaults", e);
    }

    info!("PayGate Admission v0.1.0 starting...");

    metrics::init()?;

    let manager = RateLimitManager::new(config.rate_limit.clone());
    if manager.is_enabled() {
        let limits = manager.config().default_limits();
        info!(
            global = limits.global,
            payment = limits.payment,
            refund = limits.refund,
            status = limits.status,
            unauthenticated = manager.config().unauthenticated_rate,
            burst = manager.config().burst_allowance,
            window_secs = manager.config().window_secs,
            "Admission control enabled"
        );
    } else {
        warn!("Admission control disabled; all requests will be admitted");
    }

    let reclaimer = spawn_reclaimer(manager.clone());

    let addr = config.server.bind_addr()?;
    if config.server.admin_token.is_none() {
        info!("Admin API disabled; set server.admin_token to enable /api/v1/ratelimit/*");
    }
    if config.server.trust_tenant_header {
        warn!("Trusting X-Tenant-ID from callers; run only behind an authenticating proxy");
    }
    let options = server::RouterOptions::from_config(&config.server);
    let app = server::router_with_options(manager, options);
    let result = server::serve(addr, app, server::shutdown_signal()).await;

    reclaimer.abort();
    info!("PayGate Admission stopped");
    result
}

fn init_tracing(config: &Config, verbose: bool) {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.log_level().unwrap_or(Level::INFO)
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
}
