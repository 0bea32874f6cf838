use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::trace;

const DEFAULT_CONFIG_PATH: &str = ".config/homedash/config.toml";

/// Errors raised while loading configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read
    Io(PathBuf, std::io::Error),

    /// Config file content is malformed
    Parse(PathBuf, String),

    /// A required setting is missing from the environment
    Missing(&'static str),

    /// A setting has an unusable value
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(path, err) => {
                write!(f, "failed to read config file {}: {}", path.display(), err)
            }
            ConfigError::Parse(path, msg) => {
                write!(f, "invalid config file {}: {}", path.display(), msg)
            }
            ConfigError::Missing(key) => write!(f, "missing required setting {key}"),
            ConfigError::Invalid(key, value) => write!(f, "invalid value for {key}: {value}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(_, err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub hypervisor: HypervisorConfig,
    pub router: RouterConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// Webhook used by the watch loop (optional)
    pub discord: Option<Discord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HypervisorConfig {
    /// Base URL, e.g. `https://10.0.0.2:8006`
    pub endpoint: String,
    pub user: String,
    pub token_name: String,
    pub token_value: String,
    #[serde(default = "default_hypervisor_timeout")]
    pub timeout_secs: u64,
}

impl HypervisorConfig {
    pub fn api_url(&self) -> String {
        format!("{}/api2/json", self.endpoint.trim_end_matches('/'))
    }

    pub fn auth_header(&self) -> String {
        format!(
            "PVEAPIToken={}!{}={}",
            self.user, self.token_name, self.token_value
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    pub ip: String,
    #[serde(default = "default_snmp_port")]
    pub port: u16,
    #[serde(default = "default_community")]
    pub community: String,

    /// ifIndex of the interface whose throughput is sampled
    pub interface_index: u32,
    #[serde(default = "default_snmp_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_snmp_retries")]
    pub retries: u32,
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,
}

impl RouterConfig {
    pub fn target(&self) -> String {
        if self.ip.contains(':') && !self.ip.starts_with('[') {
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_endpoint")]
    pub endpoint: String,

    /// Managed selector group
    #[serde(default = "default_proxy_group")]
    pub group: String,

    /// Bearer secret of the controller API (optional)
    pub secret: Option<String>,
    #[serde(default = "default_probe_url")]
    pub probe_url: String,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_proxy_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_switch_timeout")]
    pub switch_timeout_secs: u64,
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn switch_timeout(&self) -> Duration {
        Duration::from_secs(self.switch_timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            endpoint: default_proxy_endpoint(),
            group: default_proxy_group(),
            secret: None,
            probe_url: default_probe_url(),
            probe_timeout_ms: default_probe_timeout(),
            timeout_secs: default_proxy_timeout(),
            switch_timeout_secs: default_switch_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,

    /// Offset used for the snapshot timestamp
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

impl AggregatorConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline(),
            utc_offset_hours: default_utc_offset(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Discord {
    pub url: String,
}

fn default_hypervisor_timeout() -> u64 {
    3
}

fn default_snmp_port() -> u16 {
    161
}

fn default_community() -> String {
    "public".to_string()
}

fn default_snmp_timeout() -> u64 {
    5
}

fn default_snmp_retries() -> u32 {
    3
}

fn default_sample_interval() -> u64 {
    1_000
}

fn default_proxy_endpoint() -> String {
    "http://127.0.0.1:9090".to_string()
}

fn default_proxy_group() -> String {
    "ExitNode".to_string()
}

fn default_probe_url() -> String {
    "https://dns.google/".to_string()
}

fn default_probe_timeout() -> u64 {
    2_000
}

fn default_proxy_timeout() -> u64 {
    3
}

fn default_switch_timeout() -> u64 {
    5
}

fn default_deadline() -> u64 {
    5
}

fn default_utc_offset() -> i32 {
    7
}

impl Config {
    /// Loads the configuration.
    ///
    /// An explicit path wins, then `~/.config/homedash/config.toml`, then the
    /// process environment (after loading `.env`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(Path::to_path_buf).or_else(|| {
            let default_path = dirs::home_dir()?.join(DEFAULT_CONFIG_PATH);
            default_path.exists().then_some(default_path)
        });

        match config_path {
            Some(path) => read_config_file(&path),
            None => {
                dotenv::dotenv().ok();
                Self::from_lookup(|key| std::env::var(key).ok())
            }
        }
    }

    /// Builds the configuration from environment-style key lookups.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let endpoint = match get("PVE_ENDPOINT") {
            Some(endpoint) => endpoint,
            None => format!("https://{}:8006", require("PVE_IP")?),
        };

        let interface_index = require("PPPOE_INDEX")?;
        let interface_index = interface_index
            .parse()
            .map_err(|_| ConfigError::Invalid("PPPOE_INDEX", interface_index))?;

        let config = Config {
            hypervisor: HypervisorConfig {
                endpoint,
                user: require("PVE_USER")?,
                token_name: require("PVE_TOKEN_NAME")?,
                token_value: require("PVE_TOKEN_VALUE")?,
                timeout_secs: default_hypervisor_timeout(),
            },
            router: RouterConfig {
                ip: require("MIKROTIK_IP")?,
                port: default_snmp_port(),
                community: get("SNMP_COMMUNITY").unwrap_or_else(default_community),
                interface_index,
                timeout_secs: default_snmp_timeout(),
                retries: default_snmp_retries(),
                sample_interval_ms: default_sample_interval(),
            },
            proxy: ProxyConfig {
                endpoint: get("SINGBOX_API").unwrap_or_else(default_proxy_endpoint),
                secret: get("SINGBOX_SECRET"),
                ..ProxyConfig::default()
            },
            aggregator: AggregatorConfig::default(),
            discord: get("DISCORD_WEBHOOK_URL").map(|url| Discord { url }),
        };

        trace!("loaded config from environment: {config:?}");
        Ok(config)
    }
}

/// Reads a TOML (`.toml`) or JSON config file.
pub fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

    let parsed = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    };

    parsed
        .map_err(|msg| ConfigError::Parse(path.to_path_buf(), msg))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
