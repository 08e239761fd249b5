use crate::{ConfigError, FolioConfig, LogLevel, VerifierKind};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub struct ConfigLoader {
    explicit_file: Option<PathBuf>,
    search_paths: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        if let Some(home) = dirs::home_dir() {
            search_paths.push(home.join(".config/folio/folio.yaml"));
        }
        search_paths.push(PathBuf::from("./folio.yaml"));

        #[cfg(unix)]
        search_paths.insert(0, PathBuf::from("/etc/folio/folio.yaml"));

        Self {
            explicit_file: None,
            search_paths,
        }
    }

    pub fn with_file(mut self, path: &str) -> Self {
        self.explicit_file = Some(PathBuf::from(path));
        self
    }

    /// Replace the default search path. Files are merged in order.
    pub fn with_search_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.search_paths = paths;
        self
    }

    pub fn load(&self) -> Result<FolioConfig, ConfigError> {
        let mut config = FolioConfig::default();

        if let Some(ref explicit) = self.explicit_file {
            config = Self::read_file(explicit)?;
        } else if let Ok(env_path) = std::env::var("FOLIO_CONFIG") {
            config = Self::read_file(Path::new(&env_path))?;
        } else {
            for path in &self.search_paths {
                if path.exists() {
                    if let Ok(content) = std::fs::read_to_string(path) {
                        tracing::debug!(path = %path.display(), "Merging config file");
                        config = Self::merge_yaml(&config, &content)?;
                    }
                }
            }
        }

        Self::apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<FolioConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse_yaml(&content)
    }

    fn parse_yaml(content: &str) -> Result<FolioConfig, ConfigError> {
        let expanded = expand_env_vars(content);
        Ok(serde_yaml::from_str(&expanded)?)
    }

    fn merge_yaml(base: &FolioConfig, content: &str) -> Result<FolioConfig, ConfigError> {
        let overlay = Self::parse_yaml(content)?;
        Ok(Self::merge_configs(base, &overlay))
    }

    /// Later files win for every section they change from the defaults.
    fn merge_configs(base: &FolioConfig, overlay: &FolioConfig) -> FolioConfig {
        let defaults = FolioConfig::default();
        let mut result = base.clone();

        if overlay.server.host != defaults.server.host {
            result.server.host.clone_from(&overlay.server.host);
        }
        if overlay.server.port != defaults.server.port {
            result.server.port = overlay.server.port;
        }
        if overlay.server.request_timeout_secs.is_some() {
            result.server.request_timeout_secs = overlay.server.request_timeout_secs;
        }
        if overlay.server.shutdown_timeout_secs.is_some() {
            result.server.shutdown_timeout_secs = overlay.server.shutdown_timeout_secs;
        }
        if overlay.server.metrics != defaults.server.metrics {
            result.server.metrics = overlay.server.metrics.clone();
        }
        if overlay.auth.verifier != defaults.auth.verifier {
            result.auth.verifier = overlay.auth.verifier;
        }
        if overlay.auth.supabase_url.is_some() {
            result.auth.supabase_url.clone_from(&overlay.auth.supabase_url);
        }
        if overlay.auth.supabase_anon_key.is_some() {
            result.auth.supabase_anon_key.clone_from(&overlay.auth.supabase_anon_key);
        }
        if overlay.auth.jwt_secret.is_some() {
            result.auth.jwt_secret.clone_from(&overlay.auth.jwt_secret);
        }
        if overlay.auth.issuer.is_some() {
            result.auth.issuer.clone_from(&overlay.auth.issuer);
        }
        if overlay.auth.audience != defaults.auth.audience {
            result.auth.audience.clone_from(&overlay.auth.audience);
        }
        if overlay.auth.request_timeout_ms != defaults.auth.request_timeout_ms {
            result.auth.request_timeout_ms = overlay.auth.request_timeout_ms;
        }
        if overlay.auth.resilience != defaults.auth.resilience {
            result.auth.resilience = overlay.auth.resilience.clone();
        }
        if overlay.auth.require_verifier {
            result.auth.require_verifier = true;
        }
        if overlay.auth.token_cache != defaults.auth.token_cache {
            result.auth.token_cache = overlay.auth.token_cache.clone();
        }
        if overlay.logging.level != defaults.logging.level
            || overlay.logging.format != defaults.logging.format
            || !overlay.logging.filter.is_empty()
        {
            result.logging = overlay.logging.clone();
        }

        result
    }

    fn apply_env_overrides(config: &mut FolioConfig) {
        if let Ok(host) = std::env::var("FOLIO_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("FOLIO_PORT") {
            if let Ok(p) = port.parse() {
                config.server.port = p;
            }
        }
        if let Ok(url) = std::env::var("SUPABASE_URL") {
            if !url.is_empty() {
                config.auth.supabase_url = Some(url);
            }
        }
        if let Ok(key) = std::env::var("SUPABASE_ANON_KEY") {
            if !key.is_empty() {
                config.auth.supabase_anon_key = Some(key);
            }
        }
        if let Ok(secret) = std::env::var("SUPABASE_JWT_SECRET") {
            if !secret.is_empty() {
                config.auth.jwt_secret = Some(secret);
            }
        }
        if let Ok(kind) = std::env::var("FOLIO_VERIFIER") {
            if let Ok(k) = serde_yaml::from_str::<VerifierKind>(&kind) {
                config.auth.verifier = k;
            }
        }
        if let Ok(level) = std::env::var("FOLIO_LOG_LEVEL") {
            if let Ok(l) = serde_yaml::from_str::<LogLevel>(&level) {
                config.logging.level = l;
            }
        }
        if let Ok(max) = std::env::var("FOLIO_TOKEN_CACHE_MAX_ENTRIES") {
            if let Ok(m) = max.parse() {
                config.auth.token_cache.max_entries = m;
            }
        }
        if let Ok(ttl) = std::env::var("FOLIO_TOKEN_CACHE_TTL_MS") {
            if let Ok(t) = ttl.parse() {
                config.auth.token_cache.default_ttl_ms = t;
            }
        }
    }
}

fn expand_env_vars(content: &str) -> String {
    static ENV_VAR: OnceLock<Regex> = OnceLock::new();
    let re = ENV_VAR.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"));
    re.replace_all(content, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .to_string()
}
