use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Used when neither the environment nor the config file names a server
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Environment variable that overrides the configured base URL
pub const BASE_URL_ENV: &str = "CASEDESK_API_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    //* API base URL for requests */
    pub base_url: Option<String>,
    /// Set from `--base-url` for a single run, never written to disk
    #[serde(skip)]
    pub override_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub replay: ReplayPolicy,
    /// Window in which repeated reads of the same path are served from cache
    #[serde(default = "default_dedupe_interval_ms")]
    pub dedupe_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            replay: ReplayPolicy::default(),
            dedupe_interval_ms: default_dedupe_interval_ms(),
        }
    }
}

fn default_dedupe_interval_ms() -> u64 {
    2000
}

impl ClientConfig {
    pub fn dedupe_interval(&self) -> Duration {
        Duration::from_millis(self.dedupe_interval_ms)
    }
}

/// Which requests are re-sent after a 401 triggered a token refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayPolicy {
    /// Replay every method
    #[default]
    All,
    /// Replay GET and PUT only; a rejected POST or DELETE is reported instead
    Idempotent,
}

impl ReplayPolicy {
    pub fn allows(&self, method: &reqwest::Method) -> bool {
        match self {
            ReplayPolicy::All => true,
            ReplayPolicy::Idempotent => {
                *method != reqwest::Method::POST && *method != reqwest::Method::DELETE
            }
        }
    }
}

impl Config {
    /// `~/.config/casedesk`, not created
    pub fn config_dir() -> Option<PathBuf> {
        // Use ~/.config instead of platform-specific directory
        dirs::home_dir().map(|home| home.join(".config").join("casedesk"))
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        let app_dir = Self::config_dir()
            .ok_or_else(|| color_eyre::eyre::eyre!("Could not find home directory"))?;

        // Create directory if it doesn't exist
        if !app_dir.exists() {
            fs::create_dir_all(&app_dir)?;
        }

        Ok(app_dir.join("config.toml"))
    }

    /// Load config from file, or return default if file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    /// Validate and store a new base URL; the caller decides when to save
    pub fn set_base_url(&mut self, base_url: &str) -> Result<()> {
        validate_url(base_url).map_err(|e| color_eyre::eyre::eyre!(e))?;
        self.server.base_url = Some(base_url.trim_end_matches('/').to_string());
        Ok(())
    }

    /// Use `base_url` for this run only, ahead of the environment and the file
    pub fn override_base_url(&mut self, base_url: &str) -> Result<()> {
        validate_url(base_url).map_err(|e| color_eyre::eyre::eyre!(e))?;
        self.server.override_url = Some(base_url.trim_end_matches('/').to_string());
        Ok(())
    }

    /// Base URL after applying the run override and the environment
    pub fn base_url(&self) -> String {
        resolve_base_url(
            self.server.override_url.as_deref(),
            std::env::var(BASE_URL_ENV).ok(),
            self.server.base_url.as_deref(),
        )
    }
}

/// A run override wins over the environment, which wins over the config
/// file, which wins over the default
pub fn resolve_base_url(
    override_url: Option<&str>,
    env_value: Option<String>,
    configured: Option<&str>,
) -> String {
    override_url
        .map(str::to_string)
        .or_else(|| env_value.filter(|v| !v.trim().is_empty()))
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// Simple URL validation
pub fn validate_url(url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err("URL must start with http:// or https://".to_string());
    }

    url::Url::parse(url).map_err(|e| format!("Invalid URL format: {}", e))?;

    Ok(())
}
