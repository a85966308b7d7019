//! Schema store implementations.
//!
//! - [`InMemorySchemaStore`]: append-only arena behind a single lock
//! - [`RedbSchemaStore`]: embedded `redb` database (feature `redb`)
//!
//! Both implement [`SchemaStore`](crate::SchemaStore) and publish a new
//! version and its form's current-version pointer in one atomic commit.

pub mod memory;
#[cfg(feature = "redb")]
pub mod redb_store;

pub use memory::{InMemorySchemaStore, InMemoryTransaction};
#[cfg(feature = "redb")]
pub use redb_store::{RedbSchemaStore, RedbTransaction};
