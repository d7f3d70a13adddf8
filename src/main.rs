use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use floodgate::config::FloodgateConfig;
use floodgate::grpc::GrpcServer;
use floodgate::ratelimit::{
    ConfigResolver, GlobalRateLimiter, OperationRateLimiter, RateLimitRules,
};

/// Admission control service for API servers.
#[derive(Debug, Parser)]
#[command(name = "floodgate", version, about)]
struct Cli {
    /// Path to the service configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Path to the per-operation rules file (overrides the config file)
    #[arg(short, long)]
    rules: Option<String>,

    /// Address for the gRPC server (overrides the config file)
    #[arg(long)]
    grpc_addr: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Starting Floodgate Admission Control Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = FloodgateConfig::load(cli.config.as_deref())?;
    if let Some(addr) = cli.grpc_addr {
        config.server.grpc_addr = addr;
    }
    if cli.rules.is_some() {
        config.rate_limiting.rules_path = cli.rules;
    }
    info!(grpc_addr = %config.server.grpc_addr, "Configuration loaded");

    let rules = match config.rate_limiting.rules_path.as_deref() {
        Some(path) => RateLimitRules::from_file(path)?,
        None => RateLimitRules::new(),
    };
    let resolver = ConfigResolver::new(rules.build_registry()?, rules.build_defaults()?);
    info!(
        handlers = resolver.registry().handler_count(),
        groups = resolver.registry().group_count(),
        operation_defaults = resolver.defaults().operations.len(),
        "Rate limit rules loaded"
    );

    let rl = &config.rate_limiting;
    let operations = Arc::new(OperationRateLimiter::with_cleanup_interval(
        resolver,
        rl.cleanup_interval(),
    ));
    let global = Arc::new(GlobalRateLimiter::with_cleanup_interval(
        rl.global_limit,
        rl.global_window_secs,
        rl.cleanup_interval(),
    )?);
    operations.start();
    global.start();
    info!(
        global_limit = rl.global_limit,
        global_window_secs = rl.global_window_secs,
        "Rate limiters initialized"
    );

    let grpc_server = GrpcServer::new(
        config.server.grpc_addr,
        Arc::clone(&operations),
        Arc::clone(&global),
    );

    // Run the server with graceful shutdown on Ctrl+C
    let result = grpc_server.serve_with_shutdown(shutdown_signal()).await;

    operations.stop();
    global.stop();
    result?;

    info!("Floodgate Admission Control Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
