//! Configuration parsing and validation.
//!
//! Consumer Sense is configured via a TOML file (default: `config/csense.toml`).
//! Every section is optional and falls back to local-first defaults: the
//! mock model client, local sink mode, and mock artifacts under `./data`.
//!
//! # Example Configuration
//!
//! ```toml
//! [model]
//! provider = "gemini"
//! model = "gemini-2.5-flash"
//! api_key_env = "GEMINI_API_KEY"
//!
//! [storage]
//! output_dir = "./data/out"
//! mock_dir = "./data/mock"
//!
//! [document_store]
//! project = "my-project"
//! collection = "consumer_reviews"
//!
//! [warehouse]
//! table = "my-project.feedback.consumer_reviews"
//!
//! [server]
//! bind = "127.0.0.1:8080"
//! ```
//!
//! Credentials are never stored in the file. Each remote section names the
//! environment variable that holds its token.

use anyhow::{bail, Context, Result};
use consumer_sense_core::SourceMetadata;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub document_store: DocumentStoreConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Language-model client settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// `"mock"` (canned results, no network) or `"gemini"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_gemini_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            base_url: default_gemini_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "mock".to_string()
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    60
}

/// Where local artifacts land.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory used by the `file` sink.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Root for local-mode stand-ins of the remote sinks.
    #[serde(default = "default_mock_dir")]
    pub mock_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            mock_dir: default_mock_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data/out")
}
fn default_mock_dir() -> PathBuf {
    PathBuf::from("./data/mock")
}

/// Firestore target for the `document_store` sink.
#[derive(Debug, Deserialize, Clone)]
pub struct DocumentStoreConfig {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_firestore_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DocumentStoreConfig {
    fn default() -> Self {
        Self {
            project: None,
            database: default_database(),
            collection: default_collection(),
            token_env: default_token_env(),
            base_url: default_firestore_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_database() -> String {
    "(default)".to_string()
}
fn default_collection() -> String {
    "consumer_reviews".to_string()
}
fn default_token_env() -> String {
    "GOOGLE_OAUTH_ACCESS_TOKEN".to_string()
}
fn default_firestore_url() -> String {
    "https://firestore.googleapis.com".to_string()
}

/// BigQuery target for the `warehouse` sink.
#[derive(Debug, Deserialize, Clone)]
pub struct WarehouseConfig {
    /// Fully qualified `project.dataset.table`.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_bigquery_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            table: None,
            token_env: default_token_env(),
            base_url: default_bigquery_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_bigquery_url() -> String {
    "https://bigquery.googleapis.com".to_string()
}

impl WarehouseConfig {
    /// Split the configured table into `(project, dataset, table)`.
    pub fn table_parts(&self) -> Option<(&str, &str, &str)> {
        let table = self.table.as_deref()?;
        let mut parts = table.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(d), Some(t), None) if !p.is_empty() && !d.is_empty() && !t.is_empty() => {
                Some((p, d, t))
            }
            _ => None,
        }
    }
}

/// Web page fetching and text extraction.
#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeConfig {
    #[serde(default = "default_scrape_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_scrape_timeout(),
            min_chars: default_min_chars(),
            max_chars: default_max_chars(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_scrape_timeout() -> u64 {
    15
}
fn default_min_chars() -> usize {
    50
}
fn default_max_chars() -> usize {
    15_000
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

/// Source metadata stamped on every document this process creates.
#[derive(Debug, Deserialize, Clone)]
pub struct MetadataConfig {
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            app_version: None,
            region: None,
            language: default_language(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

impl MetadataConfig {
    /// Source metadata for an upload made through `upload_method`.
    pub fn source_metadata(&self, upload_method: &str) -> SourceMetadata {
        let mut meta = SourceMetadata::new(upload_method);
        meta.app_version = self.app_version.clone();
        meta.region = self.region.clone();
        meta.language = self.language.clone();
        meta
    }
}

/// HTTP server settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Directory walking for `csense batch`.
#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Sinks every batch item is persisted to.
    #[serde(default = "default_batch_sinks")]
    pub sinks: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            sinks: default_batch_sinks(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
        "**/*.png".to_string(),
        "**/*.jpg".to_string(),
        "**/*.jpeg".to_string(),
        "**/*.webp".to_string(),
    ]
}
fn default_batch_sinks() -> Vec<String> {
    vec!["file".to_string()]
}

/// Load configuration from `path`.
///
/// A missing file is not an error: the built-in defaults are used and a
/// warning is logged. A file that exists but does not parse, or that fails
/// validation, is.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::warn!(
            path = %path.display(),
            "config file not found, using built-in defaults"
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints serde cannot express.
pub fn validate(config: &Config) -> Result<()> {
    match config.model.provider.as_str() {
        "mock" | "gemini" => {}
        other => bail!("Unknown model provider: '{}'. Must be mock or gemini.", other),
    }
    if config.model.model.trim().is_empty() {
        bail!("model.model must not be empty");
    }
    if config.model.timeout_secs == 0 {
        bail!("model.timeout_secs must be > 0");
    }
    if config.scrape.timeout_secs == 0 {
        bail!("scrape.timeout_secs must be > 0");
    }
    if config.scrape.max_chars < config.scrape.min_chars {
        bail!(
            "scrape.max_chars ({}) must be >= scrape.min_chars ({})",
            config.scrape.max_chars,
            config.scrape.min_chars
        );
    }
    if config.document_store.timeout_secs == 0 || config.warehouse.timeout_secs == 0 {
        bail!("sink timeout_secs must be > 0");
    }
    if config.warehouse.table.is_some() && config.warehouse.table_parts().is_none() {
        bail!(
            "warehouse.table must be shaped project.dataset.table, got '{}'",
            config.warehouse.table.as_deref().unwrap_or_default()
        );
    }
    if config.batch.include_globs.is_empty() {
        bail!("batch.include_globs must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("csense.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.model.provider, "mock");
        assert_eq!(cfg.scrape.min_chars, 50);
        assert_eq!(cfg.scrape.max_chars, 15_000);
        assert_eq!(cfg.batch.sinks, vec!["file"]);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config(&write(&tmp, "")).unwrap();
        assert_eq!(cfg.server.bind, "127.0.0.1:8080");
        assert_eq!(cfg.document_store.collection, "consumer_reviews");
    }

    #[test]
    fn rejects_unknown_provider() {
        let tmp = TempDir::new().unwrap();
        let err = load_config(&write(&tmp, "[model]\nprovider = \"openai\"\n")).unwrap_err();
        assert!(err.to_string().contains("Unknown model provider"));
    }

    #[test]
    fn rejects_malformed_table() {
        let tmp = TempDir::new().unwrap();
        let err = load_config(&write(&tmp, "[warehouse]\ntable = \"dataset.table\"\n")).unwrap_err();
        assert!(err.to_string().contains("project.dataset.table"));
    }

    #[test]
    fn table_parts_split() {
        let cfg = WarehouseConfig {
            table: Some("p.d.t".into()),
            ..Default::default()
        };
        assert_eq!(cfg.table_parts(), Some(("p", "d", "t")));
    }

    #[test]
    fn metadata_section_feeds_source_metadata() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config(&write(
            &tmp,
            "[metadata]\napp_version = \"1.0.0\"\nregion = \"IN\"\n",
        ))
        .unwrap();
        let meta = cfg.metadata.source_metadata("cli");
        assert_eq!(meta.upload_method, "cli");
        assert_eq!(meta.region.as_deref(), Some("IN"));
        assert_eq!(meta.language, "en");
    }
}
