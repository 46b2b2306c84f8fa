//! Configuration for the pairing proxy.

use crate::session::{DEFAULT_MAX_RECONNECTS, DEFAULT_RECONNECT_BACKOFF};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Proxy configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// WhatsApp bridge configuration
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Credential directory configuration
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// WhatsApp Web bridge URL
    #[serde(default = "default_bridge_api_url")]
    pub api_url: String,

    /// Timeout for bridge requests
    #[serde(default = "default_bridge_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// How often session events are polled
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Browser name announced when linking a device
    #[serde(default = "default_browser")]
    pub browser: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Root directory holding one credential directory per phone number
    #[serde(default = "default_sessions_root")]
    pub root: PathBuf,

    /// Wait before replacing a client after a transient close
    #[serde(default = "default_reconnect_backoff", with = "humantime_serde")]
    pub reconnect_backoff: Duration,

    /// Reconnections allowed per session before it is marked failed
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitConfig {
    /// Requests per minute per client IP on the pairing API, 0 disables
    #[serde(default)]
    pub per_ip_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_url: default_bridge_api_url(),
            timeout: default_bridge_timeout(),
            poll_interval: default_poll_interval(),
            browser: default_browser(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            root: default_sessions_root(),
            reconnect_backoff: default_reconnect_backoff(),
            max_reconnects: default_max_reconnects(),
        }
    }
}

impl ServerConfig {
    /// Address to bind, failing on a malformed `listen_addr`.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address {:?}", self.listen_addr))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_bridge_api_url() -> String {
    "http://whatsapp-bridge:8080".into()
}

fn default_bridge_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_browser() -> String {
    "Firefox".into()
}

fn default_sessions_root() -> PathBuf {
    PathBuf::from("./sessions")
}

fn default_listen_addr() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    3000
}

fn default_reconnect_backoff() -> Duration {
    DEFAULT_RECONNECT_BACKOFF
}

fn default_max_reconnects() -> u32 {
    DEFAULT_MAX_RECONNECTS
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `PORT` takes precedence over `SERVER__PORT`.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(false),
            )
            .set_override_option("server.port", std::env::var("PORT").ok())
            .context("Failed to apply PORT override")?
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
