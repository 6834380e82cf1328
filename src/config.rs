use config::{ConfigError, Environment, File};
use serde::Deserialize;
use std::{env, time::Duration};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub lookup_timeout_ms: u64,
    pub model: ModelConfig,
    pub whois: WhoisConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Local path of the classifier artifact. Downloaded here when missing.
    pub path: String,
    pub url: Option<String>,
    /// Hex SHA-256 the downloaded artifact must match.
    pub sha256: Option<String>,
    pub download_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhoisConfig {
    /// Local copy of the public suffix list. Downloaded here when missing.
    pub suffix_list_path: String,
    pub suffix_list_url: String,
    pub suffix_list_timeout_secs: u64,
    pub max_response_bytes: usize,
}

impl Config {
    /// Defaults, then `phishscan.toml` (or `$PHISHSCAN_CONFIG`), then
    /// `PHISHSCAN_*` environment variables, e.g. `PHISHSCAN_MODEL__URL`.
    pub fn load() -> Result<Self, ConfigError> {
        let file = env::var("PHISHSCAN_CONFIG").unwrap_or_else(|_| "phishscan".to_string());

        config::Config::builder()
            .set_default("bind_addr", "0.0.0.0:8000")?
            .set_default("lookup_timeout_ms", 4000_i64)?
            .set_default("model.path", "/tmp/phishing_forest.json")?
            .set_default("model.download_timeout_secs", 60_i64)?
            .set_default("whois.suffix_list_path", "/tmp/public_suffix_list.dat")?
            .set_default("whois.suffix_list_url", publicsuffix::LIST_URL)?
            .set_default("whois.suffix_list_timeout_secs", 30_i64)?
            .set_default("whois.max_response_bytes", 65536_i64)?
            .add_source(File::with_name(&file).required(false))
            .add_source(
                Environment::with_prefix("PHISHSCAN")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

impl WhoisConfig {
    pub fn suffix_list_timeout(&self) -> Duration {
        Duration::from_secs(self.suffix_list_timeout_secs)
    }
}

impl ModelConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}
