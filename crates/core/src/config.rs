//! Configuration management for docrag.
//!
//! Configuration is merged from multiple sources, lowest precedence first:
//! - Built-in defaults
//! - Config file (`.docrag/config.yaml` in the workspace)
//! - Environment variables (`DOCRAG_*`)
//! - Command-line flags
//!
//! Service endpoints (document store, embedding, reranker, generation) and
//! retrieval parameters all live here so that every command wires the same
//! pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, AppResult};

/// Document store (Elasticsearch) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticSettings {
    /// Base URL of the Elasticsearch server
    pub url: String,

    /// Optional basic-auth username
    #[serde(default)]
    pub username: Option<String>,

    /// Optional basic-auth password
    #[serde(default)]
    pub password: Option<String>,

    /// Index to search
    pub index: String,
}

impl Default for ElasticSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            index: "docrag".to_string(),
        }
    }
}

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Embedding service URL. `None` selects the built-in mock provider.
    #[serde(default)]
    pub url: Option<String>,

    /// Vector dimensionality expected from the service
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Maximum texts per request when embedding in batches
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_dimensions() -> usize {
    1024
}

fn default_batch_size() -> usize {
    25
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            url: None,
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
        }
    }
}

/// Reranking service settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RerankSettings {
    /// Reranker URL. `None` disables reranking (fusion order is kept).
    #[serde(default)]
    pub url: Option<String>,
}

/// Retrieval pipeline parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// Hits requested from each search mode before fusion
    #[serde(default = "default_top_k_retrieval")]
    pub top_k_retrieval: usize,

    /// Evidence entries kept after reranking and merging
    #[serde(default = "default_top_k_rerank")]
    pub top_k_rerank: usize,

    /// RRF smoothing constant; larger values discount low ranks less
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,

    /// Split compound questions into sub-queries before retrieval
    #[serde(default)]
    pub use_decomposition: bool,

    /// Add paraphrase variations of each query before retrieval
    #[serde(default)]
    pub use_fan_out: bool,

    /// Upper bound on concurrent per-query retrievals
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_retrievals: usize,
}

fn default_top_k_retrieval() -> usize {
    10
}

fn default_top_k_rerank() -> usize {
    5
}

fn default_rrf_k() -> f64 {
    60.0
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k_retrieval: default_top_k_retrieval(),
            top_k_rerank: default_top_k_rerank(),
            rrf_k: default_rrf_k(),
            use_decomposition: false,
            use_fan_out: false,
            max_concurrent_retrievals: default_max_concurrent(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .docrag/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Generation provider (e.g., "ollama", "openai")
    pub provider: String,

    /// Model identifier for the generation provider
    pub model: String,

    /// Custom endpoint for the generation provider
    pub endpoint: Option<String>,

    /// API key for the generation provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Document store settings
    pub elasticsearch: ElasticSettings,

    /// Embedding service settings
    pub embedding: EmbeddingSettings,

    /// Reranking service settings
    pub rerank: RerankSettings,

    /// Retrieval pipeline parameters
    pub retrieval: RetrievalSettings,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmSection>,
    elasticsearch: Option<ElasticSettings>,
    embedding: Option<EmbeddingSettings>,
    rerank: Option<RerankSettings>,
    retrieval: Option<RetrievalSettings>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LlmSection {
    provider: Option<String>,
    model: Option<String>,
    endpoint: Option<String>,
    #[serde(rename = "apiKeyEnv")]
    api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            endpoint: None,
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            elasticsearch: ElasticSettings::default(),
            embedding: EmbeddingSettings::default(),
            rerank: RerankSettings::default(),
            retrieval: RetrievalSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, the config file, and
    /// defaults.
    ///
    /// Environment variables:
    /// - `DOCRAG_WORKSPACE`: Override workspace path
    /// - `DOCRAG_CONFIG`: Path to config file
    /// - `DOCRAG_PROVIDER`: Generation provider
    /// - `DOCRAG_MODEL`: Model identifier
    /// - `DOCRAG_API_KEY`: API key for the generation provider
    /// - `DOCRAG_ES_URL`: Document store URL
    /// - `DOCRAG_INDEX`: Document store index
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("DOCRAG_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("DOCRAG_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = if let Some(ref cf) = config.config_file {
            cf.clone()
        } else {
            config.workspace.join(".docrag/config.yaml")
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("DOCRAG_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("DOCRAG_MODEL") {
            config.model = model;
        }

        if let Ok(url) = std::env::var("DOCRAG_ES_URL") {
            config.elasticsearch.url = url;
        }

        if let Ok(index) = std::env::var("DOCRAG_INDEX") {
            config.elasticsearch.index = index;
        }

        if let Ok(key) = std::env::var("DOCRAG_API_KEY") {
            config.api_key = Some(key);
        }

        if config.log_level.is_none() {
            config.log_level = std::env::var("RUST_LOG").ok();
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &PathBuf) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(llm) = config_file.llm {
            if let Some(provider) = llm.provider {
                result.provider = provider;
            }
            if let Some(model) = llm.model {
                result.model = model;
            }
            if llm.endpoint.is_some() {
                result.endpoint = llm.endpoint;
            }
            if let Some(env_var) = llm.api_key_env {
                if let Ok(key) = std::env::var(&env_var) {
                    result.api_key = Some(key);
                }
            }
        }

        if let Some(es) = config_file.elasticsearch {
            result.elasticsearch = es;
        }

        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }

        if let Some(rerank) = config_file.rerank {
            result.rerank = rerank;
        }

        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config
    /// file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        index: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(index) = index {
            self.elasticsearch.index = index;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Validate configuration for the active provider.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["ollama", "openai"];

        if !known_providers.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        if self.provider == "openai" && self.api_key.is_none() {
            return Err(AppError::Config(
                "OpenAI provider requires an API key (DOCRAG_API_KEY or apiKeyEnv)".to_string(),
            ));
        }

        if self.elasticsearch.index.trim().is_empty() {
            return Err(AppError::Config("Document store index is empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.retrieval.top_k_retrieval, 10);
        assert_eq!(config.retrieval.top_k_rerank, 5);
        assert_eq!(config.retrieval.rrf_k, 60.0);
        assert_eq!(config.embedding.dimensions, 1024);
        assert!(!config.retrieval.use_decomposition);
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            None,
            Some("openai".to_string()),
            Some("gpt-4".to_string()),
            Some("manuals".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.provider, "openai");
        assert_eq!(overridden.model, "gpt-4");
        assert_eq!(overridden.elasticsearch.index, "manuals");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_openai_requires_key() {
        let mut config = AppConfig::default();
        config.provider = "openai".to_string();
        assert!(config.validate().is_err());

        config.api_key = Some("sk-test".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
llm:
  provider: openai
  model: gpt-4o-mini
elasticsearch:
  url: http://search.internal:9200
  index: handbooks
retrieval:
  top_k_retrieval: 20
  use_fan_out: true
"#
        )
        .unwrap();

        let config = AppConfig::default()
            .merge_yaml(&file.path().to_path_buf())
            .unwrap();

        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.elasticsearch.url, "http://search.internal:9200");
        assert_eq!(config.elasticsearch.index, "handbooks");
        assert_eq!(config.retrieval.top_k_retrieval, 20);
        // Unspecified fields keep serde defaults
        assert_eq!(config.retrieval.top_k_rerank, 5);
        assert!(config.retrieval.use_fan_out);
        assert!(!config.retrieval.use_decomposition);
    }
}
