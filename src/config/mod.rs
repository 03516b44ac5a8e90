use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Port the extraction backend listens on when derived from a page origin.
pub const DEFAULT_BACKEND_PORT: u16 = 8000;

/// Address used when neither a page origin nor a configured address is known.
pub const FALLBACK_BACKEND_URL: &str = "http://localhost:8000";

/// Upper bound the search endpoint accepts for `max_results`.
pub const MAX_SEARCH_RESULTS: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicitly configured backend address.
    pub api_url: Option<String>,
    /// Origin the client is being served from, e.g. `http://192.168.0.5:3000`.
    /// When set, the backend is assumed to live on the same host.
    pub page_origin: Option<String>,
    pub backend_port: u16,
    pub language: String,
    pub output_dir: PathBuf,
    pub user_agent: String,
    /// Seconds before a health probe gives up.
    pub health_timeout: u64,
    /// Seconds allowed to establish a connection. Transfers themselves are unbounded.
    pub connect_timeout: u64,
    pub search_max_results: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            page_origin: None,
            backend_port: DEFAULT_BACKEND_PORT,
            language: "en".to_string(),
            output_dir: PathBuf::from("."),
            user_agent: format!("ytfetch/{}", env!("CARGO_PKG_VERSION")),
            health_timeout: 5,
            connect_timeout: 10,
            search_max_results: 20,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file at `path` (if any), then environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_url) = lookup("YTFETCH_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api_url = Some(api_url);
        }
        if let Some(dir) = lookup("YTFETCH_OUTPUT_DIR").filter(|v| !v.trim().is_empty()) {
            self.output_dir = PathBuf::from(dir);
        }
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn search_max_results(&self) -> u32 {
        self.search_limit(None)
    }

    /// Result count for a search, preferring `requested` over the configured
    /// value. Either way it is kept within what the backend accepts.
    pub fn search_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.search_max_results)
            .clamp(1, MAX_SEARCH_RESULTS)
    }

    /// Resolves the backend address once for the session.
    ///
    /// A known page origin wins so that a client reached over the LAN
    /// (`192.168.0.5:3000`) talks to the backend on that same host
    /// (`192.168.0.5:8000`). Otherwise the configured address is used, and
    /// finally the local default.
    pub fn backend_url(&self) -> anyhow::Result<Url> {
        if let Some(origin) = self.page_origin.as_deref() {
            let origin = Url::parse(origin)
                .with_context(|| format!("Invalid page origin: {}", origin))?;
            let host = origin
                .host_str()
                .ok_or_else(|| anyhow::anyhow!("Page origin has no host: {}", origin))?;
            let derived = format!("{}://{}:{}", origin.scheme(), host, self.backend_port);
            return Url::parse(&derived)
                .with_context(|| format!("Invalid backend address: {}", derived));
        }

        let configured = self.api_url.as_deref().unwrap_or(FALLBACK_BACKEND_URL);
        Url::parse(configured).with_context(|| format!("Invalid backend address: {}", configured))
    }
}
