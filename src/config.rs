use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::chunking::DEFAULT_CHUNK_SIZE;
use crate::evaluation::RoleWeights;
use crate::policy::{DEFAULT_CONFIDENCE_ACCEPTABLE, DEFAULT_CONFIDENCE_GOOD, Thresholds};
use crate::search::SearchSettings;
use crate::workflow::WorkflowSettings;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Parser message.
        reason: String,
    },
    /// Values parsed but violate a range or cross-field constraint.
    #[error("Configuration out of range: {0}")]
    OutOfRange(String),
}

/// Runtime configuration, loaded once at process start.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores chunks.
    pub qdrant_url: String,
    /// Name of the Qdrant collection holding every cooperative's chunks.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Backend producing dense vectors.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the dense vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime serving embeddings and completions.
    pub ollama_url: String,
    /// Model used by the language-model collaborators.
    pub llm_model: String,
    /// Token budget of one text chunk.
    pub text_splitter_chunk_size: usize,
    /// Largest accepted upload, in megabytes.
    pub max_file_size_mb: usize,
    /// Workflow runs allowed in flight at once during batch processing.
    pub workflow_concurrency: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Orchestrator tunables.
    #[serde(skip, default)]
    pub workflow: WorkflowSettings,
    /// Search tunables.
    #[serde(skip, default)]
    pub search: SearchSettings,
}

/// Supported dense embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// In-process hashing encoder, for offline runs and tests.
    Local,
}

impl FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown provider '{other}', expected ollama or local")),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its raw value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars { lookup: &lookup };

        let analysis_thresholds = Thresholds {
            good: vars.parsed("CONFIDENCE_GOOD", DEFAULT_CONFIDENCE_GOOD)?,
            acceptable: vars.parsed("CONFIDENCE_ACCEPTABLE", DEFAULT_CONFIDENCE_ACCEPTABLE)?,
        };
        let graph_thresholds = Thresholds {
            good: vars.parsed("GRAPH_CONFIDENCE_GOOD", DEFAULT_CONFIDENCE_GOOD)?,
            acceptable: analysis_thresholds.acceptable,
        };

        let workflow = WorkflowSettings {
            max_retry_attempts: vars.parsed("MAX_RETRY_ATTEMPTS", 2)?,
            llm_timeout: Duration::from_secs(vars.parsed("LLM_TIMEOUT_SECONDS", 60)?),
            analysis_thresholds,
            graph_thresholds,
            role_weights: vars.parsed("EVALUATION_ROLE_WEIGHTS", RoleWeights::default())?,
        };

        let search = SearchSettings {
            default_top_k: vars.parsed("SEARCH_TOP_K", 5)?,
            max_top_k: vars.parsed("MAX_SEARCH_TOP_K", 100)?,
            dense_weight: vars.parsed("DENSE_WEIGHT", 0.7)?,
            sparse_weight: vars.parsed("SPARSE_WEIGHT", 0.3)?,
            overfetch_multiplier: vars.parsed("SEARCH_OVERFETCH_MULTIPLIER", 4)?,
            retriever_timeout: Duration::from_secs(vars.parsed("SEARCH_TIMEOUT_SECONDS", 30)?),
        };

        let config = Self {
            qdrant_url: vars.required("QDRANT_URL")?,
            qdrant_collection_name: vars.required("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: vars.optional("QDRANT_API_KEY"),
            embedding_provider: vars.required_parsed("EMBEDDING_PROVIDER")?,
            embedding_model: vars.required("EMBEDDING_MODEL")?,
            embedding_dimension: vars.required_parsed("EMBEDDING_DIMENSION")?,
            ollama_url: vars
                .optional("OLLAMA_URL")
                .unwrap_or_else(|| "http://127.0.0.1:11434".to_string()),
            llm_model: vars.required("LLM_MODEL")?,
            text_splitter_chunk_size: vars.parsed("TEXT_SPLITTER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            max_file_size_mb: vars.parsed("MAX_FILE_SIZE_MB", 50)?,
            workflow_concurrency: vars.parsed("WORKFLOW_CONCURRENCY", 4)?,
            server_port: vars
                .optional("SERVER_PORT")
                .map(|value| parse_value("SERVER_PORT", &value))
                .transpose()?,
            workflow,
            search,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let workflow = &self.workflow;
        let search = &self.search;

        ensure(
            workflow.max_retry_attempts >= 1,
            "MAX_RETRY_ATTEMPTS must be at least 1",
        )?;
        ensure(
            workflow.llm_timeout >= Duration::from_secs(1),
            "LLM_TIMEOUT_SECONDS must be at least 1",
        )?;
        ensure(
            workflow.analysis_thresholds.is_valid(),
            "CONFIDENCE_GOOD and CONFIDENCE_ACCEPTABLE must lie in [0, 1] \
             with CONFIDENCE_ACCEPTABLE <= CONFIDENCE_GOOD",
        )?;
        ensure(
            workflow.graph_thresholds.is_valid(),
            "GRAPH_CONFIDENCE_GOOD must lie in [0, 1] and be at least CONFIDENCE_ACCEPTABLE",
        )?;
        ensure(
            workflow.role_weights.is_valid(),
            "EVALUATION_ROLE_WEIGHTS must be non-negative with a positive sum",
        )?;
        ensure(search.max_top_k >= 1, "MAX_SEARCH_TOP_K must be at least 1")?;
        ensure(
            (1..=search.max_top_k).contains(&search.default_top_k),
            "SEARCH_TOP_K must lie in [1, MAX_SEARCH_TOP_K]",
        )?;
        ensure(
            search.dense_weight.is_finite()
                && search.sparse_weight.is_finite()
                && search.dense_weight >= 0.0
                && search.sparse_weight >= 0.0
                && search.dense_weight + search.sparse_weight > 0.0,
            "DENSE_WEIGHT and SPARSE_WEIGHT must be non-negative with a positive sum",
        )?;
        ensure(
            search.overfetch_multiplier >= 1,
            "SEARCH_OVERFETCH_MULTIPLIER must be at least 1",
        )?;
        ensure(
            search.retriever_timeout >= Duration::from_secs(1),
            "SEARCH_TIMEOUT_SECONDS must be at least 1",
        )?;
        ensure(
            self.embedding_dimension > 0,
            "EMBEDDING_DIMENSION must be positive",
        )?;
        ensure(
            self.text_splitter_chunk_size > 0,
            "TEXT_SPLITTER_CHUNK_SIZE must be positive",
        )?;
        ensure(self.max_file_size_mb > 0, "MAX_FILE_SIZE_MB must be positive")?;
        ensure(
            self.workflow_concurrency > 0,
            "WORKFLOW_CONCURRENCY must be positive",
        )
    }

    /// Upload size limit in bytes.
    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

struct Vars<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Vars<'_> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
    }

    fn required_parsed<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        parse_value(key, &self.required(key)?)
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(value) => parse_value(key, &value),
            None => Ok(default),
        }
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|err: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: err.to_string(),
        })
}

fn ensure(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange(message.to_string()))
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from `.env` and the environment and install it in the global cache.
///
/// Calling this twice keeps the first configuration.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        server_port = ?config.server_port,
        embedding_provider = ?config.embedding_provider,
        max_retry_attempts = config.workflow.max_retry_attempts,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("QDRANT_URL", "http://localhost:6333"),
            ("QDRANT_COLLECTION_NAME", "trials"),
            ("EMBEDDING_PROVIDER", "local"),
            ("EMBEDDING_MODEL", "hash"),
            ("EMBEDDING_DIMENSION", "64"),
            ("LLM_MODEL", "llama3.1"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| vars.get(key).map(|value| value.to_string()))
    }

    #[test]
    fn defaults_apply_when_optional_variables_are_absent() {
        let config = load(&base_vars()).expect("config");

        assert_eq!(config.workflow.max_retry_attempts, 2);
        assert_eq!(config.workflow.llm_timeout, Duration::from_secs(60));
        assert_eq!(config.workflow.analysis_thresholds, Thresholds::default());
        assert_eq!(config.workflow.graph_thresholds.good, 0.7);
        assert_eq!(config.search, SearchSettings::default());
        assert_eq!(config.embedding_provider, EmbeddingProvider::Local);
        assert_eq!(config.ollama_url, "http://127.0.0.1:11434");
        assert_eq!(config.text_splitter_chunk_size, 400);
        assert_eq!(config.max_file_size_bytes(), 50 * 1024 * 1024);
        assert!(config.server_port.is_none());
    }

    #[test]
    fn graph_threshold_is_independent_of_analysis_threshold() {
        let mut vars = base_vars();
        vars.insert("CONFIDENCE_GOOD", "0.8");
        vars.insert("GRAPH_CONFIDENCE_GOOD", "0.6");
        let config = load(&vars).expect("config");
        assert_eq!(config.workflow.analysis_thresholds.good, 0.8);
        assert_eq!(config.workflow.graph_thresholds.good, 0.6);
        assert_eq!(config.workflow.graph_thresholds.acceptable, 0.4);
    }

    #[test]
    fn missing_required_variable_is_reported() {
        let mut vars = base_vars();
        vars.remove("QDRANT_URL");
        let err = load(&vars).expect_err("missing url");
        assert!(matches!(err, ConfigError::MissingVariable(key) if key == "QDRANT_URL"));
    }

    #[test]
    fn unparsable_values_name_the_variable() {
        let mut vars = base_vars();
        vars.insert("MAX_RETRY_ATTEMPTS", "two");
        let err = load(&vars).expect_err("bad int");
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key, .. } if key == "MAX_RETRY_ATTEMPTS"
        ));
    }

    #[test]
    fn out_of_range_values_are_fatal() {
        let cases = [
            ("CONFIDENCE_ACCEPTABLE", "0.9"),
            ("CONFIDENCE_GOOD", "1.5"),
            ("GRAPH_CONFIDENCE_GOOD", "0.1"),
            ("DENSE_WEIGHT", "-0.2"),
            ("MAX_RETRY_ATTEMPTS", "0"),
            ("LLM_TIMEOUT_SECONDS", "0"),
            ("SEARCH_TOP_K", "500"),
            ("EVALUATION_ROLE_WEIGHTS", "0,0,0,0"),
        ];
        for (key, value) in cases {
            let mut vars = base_vars();
            vars.insert(key, value);
            let err = load(&vars).expect_err(key);
            assert!(
                matches!(err, ConfigError::OutOfRange(_)),
                "{key}={value} gave {err}"
            );
        }
    }

    #[test]
    fn unknown_provider_is_invalid() {
        let mut vars = base_vars();
        vars.insert("EMBEDDING_PROVIDER", "openai");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
