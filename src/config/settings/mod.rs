#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::SupportError;
use crate::index::DistanceMetric;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant and help answer customer's query and request. Answer on the basis of provided context only.";

pub const DEFAULT_QUERY_PROMPT: &str = r#"You are {assistant_name}, an AI-assisted customer support agent. Maintain continuity in the conversation, remembering previous turns.

Based on the current customer query and the existing conversation history, determine or suggest the following:

1.  **Urgency of the query:** On a scale of 1-5 (1 is least urgent, 5 is most urgent). Respond like: "Urgency: 3/5"
2.  **Category:** Categorize the query (sales, product, operations, etc.). Respond like: "Category: Accounts"
3.  **Response:** Generate *one* polite and helpful response. Use the examples provided in the list: {responses} as a guide for tone and helpfulness. The response *must* continue the existing conversation naturally. Don't start a new conversation. Make sure the generated response is related to the previous prompts
4.  **If the query is unclear:** Ask a clarifying follow-up question that continues the conversation.

Here is the conversation history:
{chat_history}

Now, respond to this query: {query}
"#;

pub const DEFAULT_GREETING: &str =
    "Hi, I'm {assistant_name}, your AI-assisted assistant! How can I help you today?";

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Connection settings for the OpenAI-compatible service used for embeddings and chat
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub batch_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1/".to_string(),
            api_key: None,
            timeout_seconds: crate::http::DEFAULT_TIMEOUT_SECONDS,
            retry_attempts: crate::http::DEFAULT_RETRY_ATTEMPTS,
            batch_size: crate::embeddings::openai::DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub metric: DistanceMetric,
    pub index_path: PathBuf,
    pub corpus_path: PathBuf,
    pub query_column: String,
    pub response_column: String,
    pub default_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            metric: DistanceMetric::Euclidean,
            index_path: PathBuf::from("vector_store").join("support.index"),
            corpus_path: PathBuf::from("data").join("corpus.csv"),
            query_column: "query".to_string(),
            response_column: "response".to_string(),
            default_k: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub chat_model: String,
    pub temperature: f32,
    pub assistant_name: String,
    pub greeting: String,
    pub system_prompt: String,
    pub query_prompt: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            chat_model: "gpt-4o".to_string(),
            temperature: 0.0,
            assistant_name: "Lisa".to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            query_prompt: DEFAULT_QUERY_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Missing API key: set OPENAI_API_KEY or service.api_key in the config file")]
    MissingApiKey,
    #[error("Invalid timeout: {0} (must be between 1 and 300 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid batch size: {0} (must be between 1 and 2048)")]
    InvalidBatchSize(usize),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 8192)")]
    InvalidEmbeddingDimension(usize),
    #[error("Invalid distance metric: '{0}' (must be 'L2' or 'COSINE')")]
    InvalidMetric(String),
    #[error("Invalid default k: {0} (must be at least 1)")]
    InvalidDefaultK(usize),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid column name for {0} (cannot be empty)")]
    InvalidColumn(&'static str),
    #[error("Invalid path for {0} (cannot be empty)")]
    InvalidPath(&'static str),
    #[error("Query prompt must contain the {0} placeholder")]
    MissingPlaceholder(&'static str),
    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnvValue { var: &'static str, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl From<ConfigError> for SupportError {
    #[inline]
    fn from(error: ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            base_dir: Self::config_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

impl Config {
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".support-rag"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("support-rag"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load `config.toml` from `config_dir`, apply environment overrides and validate.
    /// A missing file means defaults.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        Self::load_with(config_dir, |name| std::env::var(name).ok())
    }

    /// Same as `load` with environment variables read through `lookup`
    #[inline]
    pub fn load_with<P, F>(config_dir: P, lookup: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::load_file(config_dir)?;
        config
            .apply_overrides(lookup)
            .context("Invalid environment override")?;
        config
            .validate()
            .context("Configuration validation failed")?;
        Ok(config)
    }

    /// Read the config file only, without environment overrides. Used when editing the file so
    /// overrides are not written back.
    #[inline]
    pub fn load_file<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self {
                base_dir: config_dir.to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.to_path_buf();

        debug!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Override settings from environment-style variables. Unset or empty variables are ignored;
    /// unparsable values are errors, never silently replaced by defaults.
    #[inline]
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.service.api_key = Some(key);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.service.base_url = url;
        }
        if let Some(model) = get("CHAT_MODEL").or_else(|| get("OPENAI_MODEL")) {
            self.generation.chat_model = model;
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            self.retrieval.embedding_model = model;
        }
        if let Some(value) = get("EMBEDDING_DIMENSION") {
            self.retrieval.embedding_dimension = parse_env("EMBEDDING_DIMENSION", &value)?;
        }
        if let Some(value) = get("DISTANCE_METRIC").or_else(|| get("FAISS_DISTANCE_METRIC")) {
            self.retrieval.metric = DistanceMetric::from_str(&value)
                .map_err(|_| ConfigError::InvalidMetric(value.clone()))?;
        }
        if let Some(path) = get("INDEX_FILE_PATH") {
            self.retrieval.index_path = PathBuf::from(path);
        }
        if let Some(path) = get("CORPUS_FILE_PATH") {
            self.retrieval.corpus_path = PathBuf::from(path);
        }
        if let Some(value) = get("DEFAULT_K") {
            self.retrieval.default_k = parse_env("DEFAULT_K", &value)?;
        }
        if let Some(value) = get("TEMPERATURE") {
            self.generation.temperature = parse_env("TEMPERATURE", &value)?;
        }
        if let Some(prompt) = get("SYSTEM_PROMPT") {
            self.generation.system_prompt = prompt;
        }
        if let Some(prompt) = get("QUERY_PROMPT") {
            self.generation.query_prompt = prompt;
        }

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.service.validate()?;
        self.retrieval.validate()?;
        self.generation.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Resolve a configured path against the configuration directory
    #[inline]
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.get_base_dir().join(path)
        }
    }

    #[inline]
    pub fn index_path(&self) -> PathBuf {
        self.resolve_path(&self.retrieval.index_path)
    }

    #[inline]
    pub fn corpus_path(&self) -> PathBuf {
        self.resolve_path(&self.retrieval.corpus_path)
    }

    #[inline]
    pub fn service_url(&self) -> Result<Url, ConfigError> {
        self.service.url()
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.service.timeout_seconds)
    }

    /// The API key, required before any network client is built
    #[inline]
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.service
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Greeting with the assistant name filled in
    #[inline]
    pub fn greeting(&self) -> String {
        self.generation.render_greeting()
    }
}

fn parse_env<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvValue {
            var,
            value: value.to_string(),
        })
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.url()?;

        if !(1..=300).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        if !(1..=2048).contains(&self.batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        Ok(())
    }

    pub fn url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(self.base_url.trim())
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(self.base_url.clone()));
        }
        Ok(url)
    }

    pub fn set_base_url(&mut self, base_url: String) -> Result<(), ConfigError> {
        let temp_config = ServiceConfig {
            base_url: base_url.clone(),
            ..self.clone()
        };
        temp_config.url()?;
        self.base_url = base_url;
        Ok(())
    }

    pub fn set_timeout_seconds(&mut self, timeout_seconds: u64) -> Result<(), ConfigError> {
        if !(1..=300).contains(&timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(timeout_seconds));
        }
        self.timeout_seconds = timeout_seconds;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: usize) -> Result<(), ConfigError> {
        if !(1..=2048).contains(&batch_size) {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if !(1..=8192).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if self.default_k == 0 {
            return Err(ConfigError::InvalidDefaultK(self.default_k));
        }

        if self.index_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidPath("index_path"));
        }
        if self.corpus_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidPath("corpus_path"));
        }

        if self.query_column.trim().is_empty() {
            return Err(ConfigError::InvalidColumn("query_column"));
        }
        if self.response_column.trim().is_empty() {
            return Err(ConfigError::InvalidColumn("response_column"));
        }

        Ok(())
    }

    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    pub fn set_embedding_dimension(&mut self, dimension: usize) -> Result<(), ConfigError> {
        if !(1..=8192).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }

    pub fn set_metric(&mut self, metric: &str) -> Result<(), ConfigError> {
        self.metric =
            DistanceMetric::from_str(metric).map_err(|_| ConfigError::InvalidMetric(metric.to_string()))?;
        Ok(())
    }

    pub fn set_default_k(&mut self, k: usize) -> Result<(), ConfigError> {
        if k == 0 {
            return Err(ConfigError::InvalidDefaultK(k));
        }
        self.default_k = k;
        Ok(())
    }
}

impl GenerationConfig {
    /// The greeting with `{assistant_name}` filled in
    pub fn render_greeting(&self) -> String {
        self.greeting.replace("{assistant_name}", &self.assistant_name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if !self.query_prompt.contains("{query}") {
            return Err(ConfigError::MissingPlaceholder("{query}"));
        }

        Ok(())
    }

    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }

    pub fn set_temperature(&mut self, temperature: f32) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidTemperature(temperature));
        }
        self.temperature = temperature;
        Ok(())
    }
}
