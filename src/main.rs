use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use signaling_relay::config::{AppConfig, CliConfig, FileConfig};
use signaling_relay::server::metrics;
use signaling_relay::{run_server, Relay, RequestsLoggingLevel};

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI arguments.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// The address to listen on.
    #[clap(long, default_value = "0.0.0.0")]
    pub bind_address: String,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 8080)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping). 0 disables it.
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Payloads queued per connection before it is dropped as too slow.
    #[clap(long, default_value_t = 64)]
    pub outgoing_buffer: usize,

    /// Evict rooms that stayed empty this many seconds. Set to 0 to keep rooms forever.
    #[clap(long, default_value_t = 0)]
    pub empty_room_ttl_secs: u64,

    /// Interval in seconds between eviction runs. Only used if empty_room_ttl_secs > 0.
    #[clap(long, default_value_t = 60)]
    pub eviction_interval_secs: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            bind_address: self.bind_address.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
            logging_level: self.logging_level.clone(),
            outgoing_buffer: self.outgoing_buffer,
            empty_room_ttl_secs: self.empty_room_ttl_secs,
            eviction_interval_secs: self.eviction_interval_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    let relay = Arc::new(Relay::new(app_config.relay_settings()));

    run_server(app_config.server_config(), relay).await
}
