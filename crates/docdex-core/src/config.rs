//! Configuration management
//!
//! `config.yml` lives in the config directory; the cache directory
//! houses the index DB, the per-library DB directory, and downloaded
//! models. Both directories and the DB paths are overridable through
//! environment variables.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub hf: HfConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub headless: HeadlessConfig,

    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GitHubConfig {
    /// Personal access token for API and zipball requests
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HfConfig {
    /// Hugging Face token for gated model downloads
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelsConfig {
    /// Embedding model URI
    #[serde(default)]
    pub embed: Option<String>,

    /// Query expansion model URI
    #[serde(default)]
    pub query: Option<String>,

    /// Reranking model URI (reserved)
    #[serde(default)]
    pub rerank: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Top score at or above which text retrieval is trusted on its own
    #[serde(default = "default_strong_score")]
    pub strong_score: f64,

    /// Minimum gap between the top two scores for a strong signal
    #[serde(default = "default_strong_gap")]
    pub strong_gap: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strong_score: default_strong_score(),
            strong_gap: default_strong_gap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProxyConfig {
    /// HTTP(S) proxy endpoint applied to all outbound requests
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Explicit browser binary; discovered per platform when unset
    #[serde(default)]
    pub chrome_path: Option<String>,

    #[serde(default)]
    pub proxy: Option<String>,

    /// Page load timeout in seconds
    #[serde(default = "default_headless_timeout")]
    pub timeout: u64,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chrome_path: None,
            proxy: None,
            timeout: default_headless_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pages with a shorter extracted body are marked failed
    #[serde(default = "default_min_body_chars")]
    pub min_body_chars: usize,

    /// When set, pages without a code snippet are marked failed
    #[serde(default)]
    pub require_code_snippets: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            min_body_chars: default_min_body_chars(),
            require_code_snippets: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// How many major-version series to plan from repository tags
    #[serde(default = "default_max_major_versions")]
    pub max_major_versions: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_major_versions: default_max_major_versions(),
        }
    }
}

fn default_strong_score() -> f64 {
    0.85
}

fn default_strong_gap() -> f64 {
    0.15
}

fn default_true() -> bool {
    true
}

fn default_headless_timeout() -> u64 {
    30
}

fn default_concurrency() -> usize {
    5
}

fn default_min_body_chars() -> usize {
    200
}

fn default_max_major_versions() -> usize {
    3
}

impl Config {
    /// Load config from the default path, or defaults when absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load config from an explicit path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the config.yml path
    pub fn default_path() -> PathBuf {
        config_dir().join("config.yml")
    }
}

/// Config directory, `DOCDEX_CONFIG_DIR` overridable
pub fn config_dir() -> PathBuf {
    std::env::var("DOCDEX_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(crate::CONFIG_DIR_NAME)
        })
}

/// Cache directory, `DOCDEX_CACHE_DIR` overridable
pub fn cache_dir() -> PathBuf {
    std::env::var("DOCDEX_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(crate::CACHE_DIR_NAME)
        })
}

/// Index database path, `DOCDEX_DB_PATH` overridable
pub fn index_db_path() -> PathBuf {
    std::env::var("DOCDEX_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| cache_dir().join("index.sqlite"))
}

/// Per-library database directory, `DOCDEX_LIBRARY_DB_DIR` overridable
pub fn library_db_dir() -> PathBuf {
    std::env::var("DOCDEX_LIBRARY_DB_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| cache_dir().join("db"))
}

/// Downloaded models directory
pub fn models_dir() -> PathBuf {
    cache_dir().join("models")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.search.strong_score, 0.85);
        assert_eq!(config.search.strong_gap, 0.15);
        assert_eq!(config.crawl.concurrency, 5);
        assert_eq!(config.crawl.min_body_chars, 200);
        assert_eq!(config.ingest.max_major_versions, 3);
        assert!(config.headless.enabled);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = "github:\n  token: ghp_test\nsearch:\n  strong_score: 0.9\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.github.token.as_deref(), Some("ghp_test"));
        assert_eq!(config.search.strong_score, 0.9);
        assert_eq!(config.search.strong_gap, 0.15);
    }

    #[test]
    fn test_empty_yaml() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert!(config.github.token.is_none());
        assert!(config.models.embed.is_none());
    }
}
