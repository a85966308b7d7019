//! `formver` Server — schema version publishing, migration planning, and
//! pluggable schema storage (in-memory and `redb`).

pub mod config;
pub mod error;
pub mod manager;
pub mod observability;
pub mod storage;
pub mod traits;

pub use config::{LogConfig, LogFormat, ManagerConfig, RedbStoreConfig};
pub use error::{DuplicateVersion, StaleParent, VersioningError};
pub use manager::{DryRunReport, RecordFailure, SchemaVersionManager};
pub use observability::init_tracing;
pub use storage::InMemorySchemaStore;
#[cfg(feature = "redb")]
pub use storage::RedbSchemaStore;
pub use traits::{SchemaStore, SchemaTransaction};
