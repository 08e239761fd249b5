use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FolioConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

impl FolioConfig {
    /// Reject values the token cache cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auth.token_cache.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// Graceful shutdown timeout in seconds. Default: 30.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_timeout_secs: Option<u64>,
    /// Prometheus metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            request_timeout_secs: None,
            shutdown_timeout_secs: None,
            metrics: MetricsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifierKind {
    /// Ask the Supabase Auth server about every uncached token.
    Supabase,
    /// Verify HS256 tokens locally with the project's JWT secret.
    Jwt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub verifier: VerifierKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase_anon_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    /// Refuse to start when the selected verifier has no credentials.
    /// When false, every verification fails as unavailable instead.
    pub require_verifier: bool,
    pub request_timeout_ms: u64,
    pub resilience: VerifierResilienceConfig,
    pub token_cache: TokenCacheConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            verifier: VerifierKind::Supabase,
            supabase_url: None,
            supabase_anon_key: None,
            jwt_secret: None,
            issuer: None,
            audience: Some("authenticated".to_string()),
            require_verifier: false,
            request_timeout_ms: 5_000,
            resilience: VerifierResilienceConfig::default(),
            token_cache: TokenCacheConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Whether the selected verifier has the credentials it needs.
    pub fn verifier_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        match self.verifier {
            VerifierKind::Supabase => present(&self.supabase_url) && present(&self.supabase_anon_key),
            VerifierKind::Jwt => present(&self.jwt_secret),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierResilienceConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub max_retry_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for VerifierResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            max_retry_attempts: 2,
            base_delay_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenCacheConfig {
    pub max_entries: usize,
    pub default_ttl_ms: u64,
    pub sweep_interval_ms: u64,
    pub eviction_fraction: f64,
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl_ms: 300_000,
            sweep_interval_ms: 120_000,
            eviction_fraction: 0.2,
        }
    }
}

impl TokenCacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "auth.token_cache.max_entries",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.default_ttl_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "auth.token_cache.default_ttl_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "auth.token_cache.sweep_interval_ms",
                reason: "must be positive".to_string(),
            });
        }
        if !(self.eviction_fraction > 0.0 && self.eviction_fraction <= 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "auth.token_cache.eviction_fraction",
                reason: format!("{} is outside (0, 1]", self.eviction_fraction),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            filter: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}
