//! Configuration types for the schema version manager and its stores.

use std::path::PathBuf;
use std::str::FromStr;

use formver_core::MappingPolicy;

/// Configuration for [`SchemaVersionManager`](crate::SchemaVersionManager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Policy stamped on every diff the manager computes.
    pub mapping_policy: MappingPolicy,
    /// Upper bound on per-record failures kept in a dry-run report.
    pub max_reported_failures: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            mapping_policy: MappingPolicy::DropUnmapped,
            max_reported_failures: 100,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Single-line human-readable output.
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        })
    }
}

/// Logging configuration consumed by [`init_tracing`](crate::observability::init_tracing).
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `"info,formver_server=debug"`.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Configuration for the `redb`-backed schema store.
///
/// No `Default` impl because the database path has no sensible default.
#[derive(Debug, Clone)]
pub struct RedbStoreConfig {
    /// Path of the database file. Created if missing.
    pub path: PathBuf,
}
