mod file_config;

pub use file_config::{FileConfig, RelayConfig};

use crate::relay::RelaySettings;
use crate::server::{RequestsLoggingLevel, ServerConfig};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::net::IpAddr;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub bind_address: String,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub outgoing_buffer: usize,
    pub empty_room_ttl_secs: u64,
    pub eviction_interval_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        let server = ServerConfig::default();
        let relay = RelaySettings::default();
        Self {
            bind_address: server.bind_address,
            port: server.port,
            metrics_port: server.metrics_port,
            logging_level: server.requests_logging_level,
            outgoing_buffer: relay.outgoing_buffer,
            empty_room_ttl_secs: 0,
            eviction_interval_secs: relay.eviction_interval.as_secs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub outgoing_buffer: usize,
    /// `None` when eviction is disabled.
    pub empty_room_ttl: Option<Duration>,
    pub eviction_interval: Duration,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let bind_address = file
            .bind_address
            .unwrap_or_else(|| cli.bind_address.clone());
        if bind_address.parse::<IpAddr>().is_err() {
            bail!("Invalid bind address: {:?}", bind_address);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        if metrics_port != 0 && metrics_port == port {
            bail!("metrics_port must differ from port ({})", port);
        }

        let logging_level = match file.logging_level {
            Some(s) => match parse_logging_level(&s) {
                Some(level) => level,
                None => bail!("Invalid logging_level: {:?}", s),
            },
            None => cli.logging_level.clone(),
        };

        let relay_file = file.relay.unwrap_or_default();
        let outgoing_buffer = relay_file.outgoing_buffer.unwrap_or(cli.outgoing_buffer);
        if outgoing_buffer == 0 {
            bail!("outgoing_buffer must be greater than 0");
        }

        let empty_room_ttl_secs = relay_file
            .empty_room_ttl_secs
            .unwrap_or(cli.empty_room_ttl_secs);
        let eviction_interval_secs = relay_file
            .eviction_interval_secs
            .unwrap_or(cli.eviction_interval_secs);
        if empty_room_ttl_secs > 0 && eviction_interval_secs == 0 {
            bail!("eviction_interval_secs must be greater than 0 when empty_room_ttl_secs is set");
        }

        Ok(AppConfig {
            bind_address,
            port,
            metrics_port,
            logging_level,
            outgoing_buffer,
            empty_room_ttl: (empty_room_ttl_secs > 0)
                .then(|| Duration::from_secs(empty_room_ttl_secs)),
            eviction_interval: Duration::from_secs(eviction_interval_secs),
        })
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            outgoing_buffer: self.outgoing_buffer,
            empty_room_ttl: self.empty_room_ttl,
            eviction_interval: self.eviction_interval,
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            requests_logging_level: self.logging_level.clone(),
            bind_address: self.bind_address.clone(),
            port: self.port,
            metrics_port: self.metrics_port,
        }
    }
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
