use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_monitor_interval_secs() -> u64 {
    5
}
fn default_heartbeat_timeout_secs() -> u64 {
    30
}
fn default_fid_max_range() -> u64 {
    10000
}
fn default_fid_allocate_range() -> u64 {
    default_fid_max_range() / 100
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub id: String,
    pub log_level: String,
    pub log_base: String,
    pub apm_endpoint: Option<String>,
    pub api_address: String,
    pub api_port: u16,
    /// ledger file of the metadata store, metadata lives in memory when unset
    pub metadata_file: Option<String>,
    pub state_log_file: Option<String>,

    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
    #[serde(default = "default_fid_max_range")]
    pub fid_max_range: u64,
    #[serde(default = "default_fid_allocate_range")]
    pub fid_allocate_range: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: "chunkmaster".to_string(),
            log_level: "info".to_string(),
            log_base: "./temp/chunkmaster".to_string(),
            apm_endpoint: None,
            api_address: "0.0.0.0".to_string(),
            api_port: 8099,
            metadata_file: None,
            state_log_file: None,
            monitor_interval_secs: default_monitor_interval_secs(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            fid_max_range: default_fid_max_range(),
            fid_allocate_range: default_fid_allocate_range(),
        }
    }
}

impl Config {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

/// Defaults, then `$CONFIG_PATH` (or `./chunkmaster/config/$ENV.yaml`), then
/// `CHUNKMASTER_*` environment variables
pub fn load() -> Result<Config, figment::Error> {
    let env = std::env::var("ENV").unwrap_or_else(|_| "default".to_owned());
    let config_file_path = std::env::var("CONFIG_PATH")
        .unwrap_or_else(|_| format!("./chunkmaster/config/{}.yaml", env));
    figment(&config_file_path).extract()
}

fn figment(config_file_path: &str) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Yaml::file(config_file_path))
        .merge(Env::prefixed("CHUNKMASTER_"))
}
