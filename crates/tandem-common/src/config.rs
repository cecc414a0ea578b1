//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: CLI overrides > env vars > .env file > config.toml > defaults

use serde::Deserialize;
use std::sync::OnceLock;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Initialize the global configuration from environment and config files.
///
/// Call once at startup; the returned reference lives for the rest of the process.
pub fn init(overrides: ConfigOverrides) -> Result<&'static AppConfig, config::ConfigError> {
    let app_config = load(overrides)?;
    Ok(CONFIG.get_or_init(|| app_config))
}

/// Build an [`AppConfig`] without touching the global slot.
pub fn load(overrides: ConfigOverrides) -> Result<AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let mut builder = config::Config::builder()
        // Defaults
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 9000)?
        .set_default("signaling.client_queue_capacity", 256)?
        .set_default("signaling.command_queue_capacity", 1024)?
        .set_default("signaling.replace_duplicate_names", false)?
        .set_default("signaling.bridge_control_capacity", 64)?
        .set_default("bridge.max_frame_bytes", 16 * 1024 * 1024)?
        .set_default("logging.json", false)?
        // Optional config file
        .add_source(config::File::with_name("config").required(false))
        // Environment variables (TANDEM__SERVER__PORT, TANDEM__SIGNALING__..., etc.)
        .add_source(
            config::Environment::with_prefix("TANDEM")
                .separator("__")
                .list_separator(" ")
                .with_list_parse_key("collaborator.args")
                .try_parsing(true),
        );

    if let Some(host) = overrides.host {
        builder = builder.set_override("server.host", host)?;
    }
    if let Some(port) = overrides.port {
        builder = builder.set_override("server.port", i64::from(port))?;
    }
    if let Some(dir) = overrides.static_dir {
        builder = builder.set_override("server.static_dir", dir)?;
    }
    if let Some(json) = overrides.log_json {
        builder = builder.set_override("logging.json", json)?;
    }

    builder.build()?.try_deserialize()
}

/// Values supplied on the command line; `None` leaves the lower layers in charge.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub static_dir: Option<String>,
    pub log_json: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub signaling: SignalingConfig,
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub collaborator: CollaboratorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory of browser assets served at `/`. Unset means no static serving.
    #[serde(default)]
    pub static_dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SignalingConfig {
    /// Outbound frames buffered per client before new ones are dropped.
    pub client_queue_capacity: usize,
    /// Commands buffered in front of the coordinator.
    pub command_queue_capacity: usize,
    /// Legacy behavior: a second join with a taken name displaces the first holder.
    pub replace_duplicate_names: bool,
    /// Language changes buffered per translation bridge before it lags.
    pub bridge_control_capacity: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            client_queue_capacity: 256,
            command_queue_capacity: 1024,
            replace_duplicate_names: false,
            bridge_control_capacity: 64,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    /// Largest WebSocket frame accepted from a translation collaborator.
    pub max_frame_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}

/// External translation process launched alongside the server.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CollaboratorConfig {
    /// Executable to spawn, e.g. `python3`. Unset means nothing is launched.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}
