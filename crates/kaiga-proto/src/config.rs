use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;
use super::station::{builtin_stations, load_stations_from_toml, Catalog};
use super::wordpress;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub stations: StationsConfig,
}

/// WordPress content source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub base_url: String,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_socket_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Upper bound on connecting to a stream before `play` fails.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// 0.0 ..= 1.0
    #[serde(default = "default_volume")]
    pub volume: f32,
}

/// Optional override of the built-in station catalog.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StationsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stations_toml: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            timeout_secs: default_api_timeout(),
            per_page: default_per_page(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_http_port(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_socket_port(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            volume: default_volume(),
        }
    }
}

fn default_api_url() -> String {
    wordpress::DEFAULT_API_URL.to_string()
}

fn default_api_timeout() -> u64 {
    wordpress::DEFAULT_TIMEOUT_SECS
}

fn default_per_page() -> u32 {
    wordpress::DEFAULT_PER_PAGE
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8989
}

fn default_socket_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_volume() -> f32 {
    0.8
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AudioConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl StationsConfig {
    /// The station file if configured and readable, else the built-in list.
    pub fn load_catalog(&self) -> Catalog {
        if let Some(path) = &self.stations_toml {
            match load_stations_from_toml(path) {
                Ok(stations) if !stations.is_empty() => {
                    tracing::info!(
                        "Loaded {} stations from TOML: {}",
                        stations.len(),
                        path.display()
                    );
                    return Catalog::new(stations);
                }
                Ok(_) => tracing::warn!("{} has no stations, using built-in list", path.display()),
                Err(e) => tracing::warn!("Failed to load {}: {}", path.display(), e),
            }
        }
        Catalog::new(builtin_stations())
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
