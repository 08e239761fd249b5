//! Folio Configuration System
//!
//! YAML configuration for the Folio auth gateway.
//!
//! # Configuration Loading Priority
//!
//! 1. Compiled-in defaults
//! 2. `/etc/folio/folio.yaml` (system-wide)
//! 3. `~/.config/folio/folio.yaml` (user)
//! 4. `./folio.yaml` (project-local)
//! 5. Explicit file (`--config`) or `FOLIO_CONFIG=/path/to/config.yaml`
//! 6. Environment variables (highest priority)
//!
//! # Example Configuration
//!
//! ```yaml
//! server:
//!   port: 5000
//!
//! auth:
//!   verifier: supabase
//!   supabase_url: "${SUPABASE_URL}"
//!   supabase_anon_key: "${SUPABASE_ANON_KEY}"
//!   token_cache:
//!     max_entries: 1000
//!     default_ttl_ms: 300000
//!     sweep_interval_ms: 120000
//!     eviction_fraction: 0.2
//! ```

#![allow(missing_docs)]

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::*;

/// Load configuration from default locations.
///
/// Searches for config files in order and merges them.
/// Environment variables override file values.
pub fn load() -> Result<FolioConfig, ConfigError> {
    ConfigLoader::new().load()
}

/// Load configuration from a specific file.
pub fn load_from_file(path: &str) -> Result<FolioConfig, ConfigError> {
    ConfigLoader::new().with_file(path).load()
}
