//! Configuration management for Vejovis services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values
//!
//! The legacy flat variables `DATABASE_URL`, `OPENAI_API_KEY`,
//! `DEEPSEEK_API_KEY` and `PDF_BASE_URL` are honoured when the structured
//! keys are absent.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chat-completion provider configuration
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Retrieval tuning
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Object storage for source PDFs
    #[serde(default)]
    pub storage: StorageConfig,

    /// Automated-client filter
    #[serde(default)]
    pub guard: GuardConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds (not applied to streaming bodies)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionConfig {
    /// API key for the chat-completion provider
    pub api_key: Option<String>,

    /// Full chat-completions endpoint URL
    #[serde(default = "default_completion_endpoint")]
    pub endpoint: String,

    /// Model to use
    #[serde(default = "default_completion_model")]
    pub model: String,

    /// Connect timeout in seconds; the stream itself is unbounded
    #[serde(default = "default_completion_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Similarity floor passed to the vector-search procedures
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,

    /// Default result count for paper-level search
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Default result count for chunk-level search
    #[serde(default = "default_search_limit")]
    pub content_limit: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Base URL that source PDFs are served under, keyed by filename
    pub pdf_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuardConfig {
    /// Reject requests whose user agent looks automated
    #[serde(default = "default_enabled")]
    pub block_bots: bool,

    /// Case-insensitive substrings that mark a user agent as automated
    #[serde(default = "default_bot_patterns")]
    pub bot_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (debug, info, vejovis_gateway=debug, ...)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (per client IP)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default)]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_completion_endpoint() -> String { "https://api.deepseek.com/v1/chat/completions".to_string() }
fn default_completion_model() -> String { crate::DEFAULT_COMPLETION_MODEL.to_string() }
fn default_completion_connect_timeout() -> u64 { 15 }
fn default_match_threshold() -> f64 { 0.1 }
fn default_search_limit() -> usize { 5 }
fn default_enabled() -> bool { true }
fn default_bot_patterns() -> Vec<String> {
    [
        "bot", "crawl", "spider", "scrape", "wget", "curl",
        "python", "headless", "phantom", "selenium",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_rate_limit() -> u32 { 5 }
fn default_burst() -> u32 { 20 }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_completion_endpoint(),
            model: default_completion_model(),
            connect_timeout_secs: default_completion_connect_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            search_limit: default_search_limit(),
            content_limit: default_search_limit(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            block_bots: default_enabled(),
            bot_patterns: default_bot_patterns(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let builder = Config::builder()
            // Start with defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            );

        let mut config: AppConfig = Self::with_legacy_env(builder)?.build()?.try_deserialize()?;
        config.fill_from_legacy_env();
        Ok(config)
    }

    /// `database.url` is required; accept the conventional `DATABASE_URL` as its default.
    fn with_legacy_env(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        match std::env::var("DATABASE_URL") {
            Ok(url) => builder.set_default("database.url", url),
            Err(_) => Ok(builder),
        }
    }

    fn fill_from_legacy_env(&mut self) {
        fn env(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }

        if self.embedding.api_key.is_none() {
            self.embedding.api_key = env("OPENAI_API_KEY");
        }
        if self.completion.api_key.is_none() {
            self.completion.api_key = env("DEEPSEEK_API_KEY");
        }
        if self.storage.pdf_base_url.is_none() {
            self.storage.pdf_base_url = env("PDF_BASE_URL");
        }
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl StorageConfig {
    /// Link to the source PDF for a stored filename, if a bucket is configured
    pub fn pdf_url(&self, filename: &str) -> Option<String> {
        let base = self.pdf_base_url.as_deref()?.trim_end_matches('/');
        if base.is_empty() || filename.is_empty() {
            return None;
        }
        Some(format!("{}/{}", base, filename.trim_start_matches('/')))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/vejovis".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            embedding: EmbeddingConfig::default(),
            completion: CompletionConfig::default(),
            retrieval: RetrievalConfig::default(),
            storage: StorageConfig::default(),
            guard: GuardConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.completion.model, "deepseek-chat");
        assert!(!config.rate_limit.enabled);
        assert!(config.guard.block_bots);
    }

    #[test]
    fn test_match_threshold_default() {
        let config = AppConfig::default();
        assert!((config.retrieval.match_threshold - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.retrieval.search_limit, 5);
    }

    #[test]
    fn test_pdf_url() {
        let storage = StorageConfig {
            pdf_base_url: Some("https://files.example.org/papers/".to_string()),
        };
        assert_eq!(
            storage.pdf_url("smith_1995.pdf").as_deref(),
            Some("https://files.example.org/papers/smith_1995.pdf")
        );
        assert_eq!(storage.pdf_url(""), None);
        assert_eq!(StorageConfig::default().pdf_url("a.pdf"), None);
    }
}
