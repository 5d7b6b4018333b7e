//! Poller configuration and the providers that supply it.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Where to poll and how often.
///
/// Stored as JSON, either bare or nested under `dataGrabber`:
/// ```json
/// {
///   "dataGrabber": {
///     "host": "dadosabertos.rio.rj.gov.br",
///     "path": "/apiTransporte/apresentacao/rest/index.cfm/onibus",
///     "intervalTime": 20000,
///     "timeout": 10000
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrabberConfig {
    pub host: String,
    pub path: String,
    /// Milliseconds between the end of one cycle and the next request.
    pub interval_time: u64,
    /// Milliseconds a request may stay in flight before it is aborted.
    pub timeout: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    Nested {
        #[serde(rename = "dataGrabber")]
        data_grabber: GrabberConfig,
    },
    Bare(GrabberConfig),
}

impl GrabberConfig {
    /// Parses a config document and validates it.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(content).context("malformed config")?;
        let config = match file {
            ConfigFile::Nested { data_grabber } => data_grabber,
            ConfigFile::Bare(config) => config,
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{path}'"))?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("config: host must not be empty");
        }
        if self.path.trim().is_empty() {
            bail!("config: path must not be empty");
        }
        if self.interval_time == 0 {
            bail!("config: intervalTime must be positive");
        }
        if self.timeout == 0 {
            bail!("config: timeout must be positive");
        }
        Ok(())
    }

    /// Full request URL. Hosts without a scheme are reached over plain http.
    pub fn url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}{}", host, self.path)
        } else {
            format!("http://{}{}", host, self.path)
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_time)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }
}

/// Supplies the config for the next cycle.
///
/// Called once at the start of every cycle, so implementations decide whether
/// changes are picked up while running.
pub trait ConfigProvider: Send + Sync {
    fn current(&self) -> Result<GrabberConfig>;
}

/// A config fixed at construction.
pub struct StaticConfig(pub GrabberConfig);

impl ConfigProvider for StaticConfig {
    fn current(&self) -> Result<GrabberConfig> {
        Ok(self.0.clone())
    }
}

/// Re-reads a JSON file on every call, so edits apply from the next cycle.
pub struct FileConfig {
    path: PathBuf,
}

impl FileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigProvider for FileConfig {
    fn current(&self) -> Result<GrabberConfig> {
        GrabberConfig::load(&self.path.to_string_lossy())
    }
}
