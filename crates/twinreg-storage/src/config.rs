//! Registry configuration and construction.
//!
//! A [`RegistryConfig`] picks one backend and the decorators to layer on it.
//! It is read from a JSON file or from `TWINREG_*` environment variables:
//!
//! - `TWINREG_BACKEND`: `memory` (default), `sqlite` or `elasticsearch`
//! - `TWINREG_SQLITE_PATH`: database file (default: "twinreg.db")
//! - `TWINREG_ES_URL`: cluster URL (default: "http://localhost:9200")
//! - `TWINREG_ES_INDEX`: index name (default: "shell-descriptors")
//! - `TWINREG_EVENTS`: `log` or `none` (default)
//! - `TWINREG_READ_ONLY`: `true`/`1` rejects every write

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::authorization::{ActionAuthorizer, AuthorizingDecorator};
use crate::compose::{compose, Decorator};
use crate::document::{DocumentStore, ElasticsearchIndex};
use crate::error::RegistryError;
use crate::eventing::{EventingDecorator, TracingEventSink};
use crate::locked::LockedRegistry;
use crate::sqlite::SqliteStore;
use crate::traits::ShellRegistry;

pub const DEFAULT_SQLITE_PATH: &str = "twinreg.db";
pub const DEFAULT_ES_URL: &str = "http://localhost:9200";
pub const DEFAULT_ES_INDEX: &str = "shell-descriptors";

/// Storage backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    #[default]
    #[serde(rename = "memory")]
    InMemory,
    Sqlite {
        path: String,
    },
    Elasticsearch {
        url: String,
        index: String,
    },
}

/// Where registry events go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventsConfig {
    #[default]
    None,
    Log,
}

/// Complete registry configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    pub backend: BackendConfig,
    pub events: EventsConfig,
    pub read_only: bool,
}

impl RegistryConfig {
    /// Reads the configuration from `TWINREG_*` environment variables.
    pub fn from_env() -> Result<Self, RegistryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Builds a configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RegistryError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let backend = match var("TWINREG_BACKEND", "memory").as_str() {
            "memory" => BackendConfig::InMemory,
            "sqlite" => BackendConfig::Sqlite {
                path: var("TWINREG_SQLITE_PATH", DEFAULT_SQLITE_PATH),
            },
            "elasticsearch" => BackendConfig::Elasticsearch {
                url: var("TWINREG_ES_URL", DEFAULT_ES_URL),
                index: var("TWINREG_ES_INDEX", DEFAULT_ES_INDEX),
            },
            other => {
                return Err(RegistryError::Configuration(format!(
                    "unknown TWINREG_BACKEND '{other}'"
                )))
            }
        };
        let events = match var("TWINREG_EVENTS", "none").as_str() {
            "none" => EventsConfig::None,
            "log" => EventsConfig::Log,
            other => {
                return Err(RegistryError::Configuration(format!(
                    "unknown TWINREG_EVENTS '{other}'"
                )))
            }
        };
        let read_only = matches!(var("TWINREG_READ_ONLY", "false").as_str(), "true" | "1");

        Ok(RegistryConfig {
            backend,
            events,
            read_only,
        })
    }
}

/// Constructs the configured backend and wraps it in the configured
/// decorators. Authorization ends up outermost, so denied calls never reach
/// the eventing layer.
pub fn build_registry(config: &RegistryConfig) -> Result<Arc<dyn ShellRegistry>, RegistryError> {
    let base: Arc<dyn ShellRegistry> = match &config.backend {
        BackendConfig::InMemory => Arc::new(LockedRegistry::in_memory()),
        BackendConfig::Sqlite { path } => Arc::new(SqliteStore::new(path)?),
        BackendConfig::Elasticsearch { url, index } => {
            let index = ElasticsearchIndex::new(url, index)?;
            index.ensure_index()?;
            Arc::new(DocumentStore::new(index))
        }
    };
    info!(
        backend = ?config.backend,
        events = ?config.events,
        read_only = config.read_only,
        "registry constructed"
    );

    let mut decorators: Vec<Box<dyn Decorator<dyn ShellRegistry>>> = Vec::new();
    if config.events == EventsConfig::Log {
        decorators.push(Box::new(EventingDecorator::new(Arc::new(TracingEventSink))));
    }
    if config.read_only {
        decorators.push(Box::new(AuthorizingDecorator::new(Arc::new(
            ActionAuthorizer::read_only(),
        ))));
    }
    Ok(compose(base, &decorators))
}
