use async_trait::async_trait;
use formver_core::{FormSchema, SchemaId};

/// Pluggable persistence backend for schema versions.
/// Implementations: in-memory (tests, embedding), `redb` (single node).
///
/// Schema versions are append-only. Each logical form (`name`) has exactly
/// one *current* version; committing a new version of a form advances that
/// pointer in the same transaction that inserts the version. The pointer
/// only moves from a version to one of its children.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Load a committed schema version by id.
    async fn load_schema(&self, id: &SchemaId) -> anyhow::Result<Option<FormSchema>>;

    /// The current version of the form called `name`, if any.
    async fn current(&self, name: &str) -> anyhow::Result<Option<FormSchema>>;

    /// Every committed version of the form called `name`, oldest first.
    async fn history(&self, name: &str) -> anyhow::Result<Vec<FormSchema>>;

    /// Open a transaction. Writes staged in it stay invisible until commit.
    async fn begin(&self) -> anyhow::Result<Box<dyn SchemaTransaction>>;
}

/// A unit of work against a [`SchemaStore`].
///
/// Dropping a transaction without committing discards its staged writes.
/// After a failed commit nothing has been published; callers still call
/// [`rollback`](SchemaTransaction::rollback) to release the transaction.
#[async_trait]
pub trait SchemaTransaction: Send {
    /// Load a schema version, seeing this transaction's staged writes.
    async fn load_schema(&mut self, id: &SchemaId) -> anyhow::Result<Option<FormSchema>>;

    /// The current version of the form called `name`, seeing this
    /// transaction's staged writes.
    async fn current(&mut self, name: &str) -> anyhow::Result<Option<FormSchema>>;

    /// Stage a new schema version. It becomes the current version of its
    /// form on commit.
    async fn save_schema(&mut self, schema: FormSchema) -> anyhow::Result<()>;

    /// Publish all staged writes atomically.
    ///
    /// Fails with [`DuplicateVersion`](crate::error::DuplicateVersion) if a
    /// staged `(name, version)` already exists, and with
    /// [`StaleParent`](crate::error::StaleParent) if a staged version's
    /// parent is not the current version of its form at commit time.
    async fn commit(&mut self) -> anyhow::Result<()>;

    /// Discard all staged writes.
    async fn rollback(&mut self) -> anyhow::Result<()>;
}
