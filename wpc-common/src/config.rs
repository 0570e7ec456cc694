//! Client configuration loading
//!
//! Resolution order for the configuration file:
//! 1. Command-line argument (highest priority)
//! 2. `WPC_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/wpc/config.toml`)
//! 4. Compiled defaults (fallback)
//!
//! `WPC_BASE_URL` overrides the base URL of whatever was loaded.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::domains::Domains;
use crate::projection::{PlaylistRange, PlaylistRef};
use crate::query::QuerySpec;
use crate::{Error, Result};

pub const CONFIG_ENV_VAR: &str = "WPC_CONFIG";
pub const BASE_URL_ENV_VAR: &str = "WPC_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8880";

/// How a notification is shared between handles whose filters both match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Every matching handle sees the notification
    #[default]
    Independent,
    /// The first matching one-shot handle, in attach order, consumes it
    Consuming,
}

/// State poller defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            timeout_ms: 5_000,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Expectation defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectationConfig {
    /// Deadline applied when the caller supplies none
    pub timeout_ms: Option<u64>,
    pub match_policy: MatchPolicy,
}

impl ExpectationConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Projection used for payloads of the update subscription
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateProjection {
    pub trcolumns: Option<Vec<String>>,
    pub plref: Option<PlaylistRef>,
    pub plrange: Option<PlaylistRange>,
    pub plcolumns: Option<Vec<String>>,
}

impl UpdateProjection {
    /// Query spec for `domains` carrying this projection
    ///
    /// Parameters of domains outside `domains` are left out so the spec
    /// always composes.
    pub fn query_spec(&self, domains: Domains) -> QuerySpec {
        QuerySpec {
            player: domains.player,
            playlists: domains.playlists,
            playlist_items: domains.playlist_items,
            trcolumns: self.trcolumns.clone().filter(|_| domains.player),
            plref: self.plref.clone().filter(|_| domains.playlist_items),
            plrange: self.plrange.filter(|_| domains.playlist_items),
            plcolumns: self.plcolumns.clone().filter(|_| domains.playlist_items),
        }
    }
}

/// Consistency window between update payloads and pull queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Delay before the first cross-check query
    pub settle_ms: u64,
    /// How long a pull query may lag an update before they count as inconsistent
    pub staleness_ms: u64,
    /// JSON pointers ignored when comparing (values that drift on their own)
    pub volatile_fields: Vec<String>,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            settle_ms: 0,
            staleness_ms: 1_000,
            volatile_fields: vec!["/player/activeItem/position".to_string()],
        }
    }
}

impl ConsistencyConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }
}

/// Complete client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub poll: PollConfig,
    pub expectation: ExpectationConfig,
    pub updates: UpdateProjection,
    pub consistency: ConsistencyConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: 10_000,
            poll: PollConfig::default(),
            expectation: ExpectationConfig::default(),
            updates: UpdateProjection::default(),
            consistency: ConsistencyConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration following the resolution order in the module docs
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path)? {
            Some(path) => Self::load_file(&path)?,
            None => {
                debug!("No configuration file found, using defaults");
                Self::default()
            }
        };

        if let Ok(base_url) = std::env::var(BASE_URL_ENV_VAR) {
            debug!("Base URL overridden by {}", BASE_URL_ENV_VAR);
            config.base_url = base_url;
            config.validate()?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.poll.interval_ms == 0 {
            return Err(Error::Config("poll.interval_ms must be positive".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

/// Find the configuration file to load, if any
///
/// An explicit path (argument or environment) must exist; the platform
/// default is used only when present.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return require_existing(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return require_existing(PathBuf::from(path));
    }

    // Priority 3: Platform config directory
    if let Some(path) = default_config_path() {
        if path.exists() {
            return Ok(Some(path));
        }
    }

    // Priority 4: compiled defaults
    Ok(None)
}

/// `<config_dir>/wpc/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("wpc").join("config.toml"))
}

fn require_existing(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.exists() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", path)))
    }
}
