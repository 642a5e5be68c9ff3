//! Configuration management for QA Base.
//!
//! Configuration is merged from several sources, lowest precedence first:
//! - Built-in defaults
//! - Config file (`.qabase/config.yaml` in the workspace)
//! - Environment variables
//! - Command-line flags
//!
//! Derived state (the SQLite index) lives under `.qabase/`; the record store
//! itself defaults to `qa_database.json` at the workspace root.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Embedding providers the knowledge crate knows how to build.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["hashing", "ollama"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .qabase/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Record store location
    pub records_path: PathBuf,

    /// SQLite vector index location
    pub index_path: PathBuf,

    /// Embedding provider settings
    pub embedding: EmbeddingSettings,

    /// Retrieval defaults
    pub retrieval: RetrievalSettings,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingSettings {
    /// Provider name: "hashing" or "ollama"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier (provider-specific)
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding vector dimensions
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Base URL for HTTP providers
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Maximum texts per embedding request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_provider() -> String {
    "hashing".to_string()
}

fn default_model() -> String {
    "hashing-v1".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_batch_size() -> usize {
    64
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dimensions: default_dimensions(),
            endpoint: None,
            batch_size: default_batch_size(),
        }
    }
}

/// Max-marginal-relevance retrieval defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalSettings {
    /// Results returned to the caller
    #[serde(default = "default_k")]
    pub k: usize,

    /// Nearest candidates fetched before diversity selection
    #[serde(default = "default_fetch_k")]
    pub fetch_k: usize,

    /// Relevance/diversity trade-off: 1.0 is pure relevance
    #[serde(default = "default_lambda")]
    pub lambda: f32,
}

fn default_k() -> usize {
    3
}

fn default_fetch_k() -> usize {
    5
}

fn default_lambda() -> f32 {
    0.5
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            k: default_k(),
            fetch_k: default_fetch_k(),
            lambda: default_lambda(),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    records: Option<RecordsConfig>,
    index: Option<IndexConfig>,
    embedding: Option<EmbeddingSettings>,
    retrieval: Option<RetrievalSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordsConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::for_workspace(workspace)
    }
}

impl AppConfig {
    /// Default configuration rooted at `workspace`.
    pub fn for_workspace(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        Self {
            records_path: workspace.join("qa_database.json"),
            index_path: workspace.join(".qabase").join("index.sqlite"),
            workspace,
            config_file: None,
            embedding: EmbeddingSettings::default(),
            retrieval: RetrievalSettings::default(),
            log_level: None,
            verbose: false,
            no_color: false,
        }
    }

    /// Load configuration from defaults, the YAML file, and environment variables.
    ///
    /// Environment variables:
    /// - `QABASE_WORKSPACE`: Override workspace path
    /// - `QABASE_CONFIG`: Path to config file
    /// - `QABASE_RECORDS`: Record store path
    /// - `QABASE_EMBEDDING_PROVIDER`: Embedding provider
    /// - `QABASE_EMBEDDING_MODEL`: Embedding model
    /// - `OLLAMA_URL`: Endpoint for the ollama provider
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use qabase_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Records: {:?}", config.records_path);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Like [`AppConfig::load`], with an explicit workspace and config file
    /// (e.g. from CLI flags) taking the place of `QABASE_WORKSPACE` and
    /// `QABASE_CONFIG`.
    ///
    /// The workspace is resolved first so that its `.qabase/config.yaml` is
    /// the one read; the YAML is merged before environment variables apply.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        Self::load_with_env(workspace, config_file, |key| std::env::var(key).ok())
    }

    fn load_with_env<F>(
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        env: F,
    ) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match workspace.or_else(|| env("QABASE_WORKSPACE").map(PathBuf::from)) {
            Some(workspace) => Self::for_workspace(workspace),
            None => Self::default(),
        };

        config.config_file = config_file.or_else(|| env("QABASE_CONFIG").map(PathBuf::from));

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        match config.config_file.clone() {
            // An explicitly named file must exist
            Some(path) => config = config.merge_yaml(&path)?,
            None => {
                let default_path = config.state_dir().join("config.yaml");
                if default_path.exists() {
                    config = config.merge_yaml(&default_path)?;
                }
            }
        }

        config.apply_env(env);
        Ok(config)
    }

    fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(records) = env("QABASE_RECORDS") {
            self.records_path = PathBuf::from(records);
        }

        if let Some(provider) = env("QABASE_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }

        if let Some(model) = env("QABASE_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }

        if let Some(url) = env("OLLAMA_URL") {
            self.embedding.endpoint = Some(url);
        }

        if let Some(level) = env("RUST_LOG") {
            self.log_level = Some(level);
        }

        if env("NO_COLOR").is_some() {
            self.no_color = true;
        }
    }

    /// Merge a YAML configuration file into this config.
    ///
    /// Relative paths in the file resolve against the workspace.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(path) = config_file.records.and_then(|r| r.path) {
            result.records_path = result.workspace.join(path);
        }

        if let Some(path) = config_file.index.and_then(|i| i.path) {
            result.index_path = result.workspace.join(path);
        }

        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
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
    /// CLI flags take precedence over the config file and environment.
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        records: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            let rebased = Self::for_workspace(workspace);
            // Only paths still at their defaults follow the new workspace
            if self.records_path == self.workspace.join("qa_database.json") {
                self.records_path = rebased.records_path;
            }
            if self.index_path == self.state_dir().join("index.sqlite") {
                self.index_path = rebased.index_path;
            }
            self.workspace = rebased.workspace;
        }

        if let Some(records) = records {
            self.records_path = records;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .qabase state directory.
    pub fn state_dir(&self) -> PathBuf {
        self.workspace.join(".qabase")
    }

    /// Ensure the directories holding the index and record store exist.
    pub fn ensure_dirs(&self) -> AppResult<()> {
        for path in [&self.index_path, &self.records_path] {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AppError::Config(format!("Failed to create {:?}: {}", parent, e))
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Validate embedding and retrieval settings.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.embedding.provider.as_str();
        if !KNOWN_EMBEDDING_PROVIDERS.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(AppError::Config(
                "Embedding batch size must be greater than zero".to_string(),
            ));
        }

        let retrieval = &self.retrieval;
        if retrieval.k == 0 || retrieval.k > retrieval.fetch_k {
            return Err(AppError::Config(format!(
                "Retrieval requires 0 < k <= fetch_k (got k={}, fetch_k={})",
                retrieval.k, retrieval.fetch_k
            )));
        }

        if !(0.0..=1.0).contains(&retrieval.lambda) {
            return Err(AppError::Config(format!(
                "Retrieval lambda must be within [0, 1] (got {})",
                retrieval.lambda
            )));
        }

        Ok(())
    }
}
