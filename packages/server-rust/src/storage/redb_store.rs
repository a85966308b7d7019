//! [`SchemaStore`] backed by an embedded `redb` database.
//!
//! Tables:
//!
//! - `schemas`: schema id -> `MsgPack`-encoded [`FormSchema`]
//! - `forms`: form name -> `MsgPack`-encoded id list, oldest first (the last
//!   id is the current version)
//! - `versions`: `name NUL version` -> schema id, enforcing uniqueness
//!
//! A commit writes all three tables in one redb write transaction, so the
//! current-version pointer never moves without its version being stored.
//! All database work runs on the blocking thread pool.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use formver_core::{FormSchema, SchemaId};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};

use crate::config::RedbStoreConfig;
use crate::error::{DuplicateVersion, StaleParent};
use crate::traits::{SchemaStore, SchemaTransaction};

const SCHEMAS: TableDefinition<&str, &[u8]> = TableDefinition::new("schemas");
const FORMS: TableDefinition<&str, &[u8]> = TableDefinition::new("forms");
const VERSIONS: TableDefinition<&str, &str> = TableDefinition::new("versions");

fn version_key(name: &str, version: &str) -> String {
    format!("{name}\u{0}{version}")
}

/// Durable single-node schema store.
#[derive(Clone)]
pub struct RedbSchemaStore {
    db: Arc<Database>,
}

impl RedbSchemaStore {
    /// Opens (or creates) the database at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its tables created.
    pub fn open(config: &RedbStoreConfig) -> anyhow::Result<Self> {
        Self::open_path(&config.path)
    }

    fn open_path(path: &Path) -> anyhow::Result<Self> {
        let db = Database::create(path)
            .with_context(|| format!("failed to open schema database at {}", path.display()))?;

        // Create tables up front so read transactions never see them missing.
        let txn = db.begin_write()?;
        {
            txn.open_table(SCHEMAS)?;
            txn.open_table(FORMS)?;
            txn.open_table(VERSIONS)?;
        }
        txn.commit()?;

        tracing::info!(path = %path.display(), "opened redb schema store");
        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        run_blocking(Arc::clone(&self.db), f).await
    }
}

async fn run_blocking<T, F>(db: Arc<Database>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .context("schema store task panicked")?
}

fn read_schema(db: &Database, id: &str) -> anyhow::Result<Option<FormSchema>> {
    let txn = db.begin_read()?;
    let schemas = txn.open_table(SCHEMAS)?;
    let Some(bytes) = schemas.get(id)? else {
        return Ok(None);
    };
    let schema = rmp_serde::from_slice(bytes.value())
        .with_context(|| format!("corrupt schema record {id}"))?;
    Ok(Some(schema))
}

fn decode_ids(bytes: &[u8], name: &str) -> anyhow::Result<Vec<SchemaId>> {
    rmp_serde::from_slice(bytes).with_context(|| format!("corrupt version list for form {name:?}"))
}

fn read_current(db: &Database, name: &str) -> anyhow::Result<Option<FormSchema>> {
    let txn = db.begin_read()?;
    let forms = txn.open_table(FORMS)?;
    let ids = match forms.get(name)? {
        Some(bytes) => decode_ids(bytes.value(), name)?,
        None => return Ok(None),
    };
    let Some(id) = ids.last() else {
        return Ok(None);
    };

    let schemas = txn.open_table(SCHEMAS)?;
    let bytes = schemas
        .get(id.as_str())?
        .with_context(|| format!("form {name:?} lists missing schema {id}"))?;
    let schema = rmp_serde::from_slice(bytes.value())
        .with_context(|| format!("corrupt schema record {id}"))?;
    Ok(Some(schema))
}

fn read_history(db: &Database, name: &str) -> anyhow::Result<Vec<FormSchema>> {
    let txn = db.begin_read()?;
    let forms = txn.open_table(FORMS)?;
    let schemas = txn.open_table(SCHEMAS)?;

    let ids = match forms.get(name)? {
        Some(bytes) => decode_ids(bytes.value(), name)?,
        None => return Ok(Vec::new()),
    };

    let mut history = Vec::with_capacity(ids.len());
    for id in &ids {
        let bytes = schemas
            .get(id.as_str())?
            .with_context(|| format!("form {name:?} lists missing schema {id}"))?;
        history.push(rmp_serde::from_slice(bytes.value())?);
    }
    Ok(history)
}

fn write_staged(txn: &WriteTransaction, staged: &[FormSchema]) -> anyhow::Result<()> {
    let mut schemas = txn.open_table(SCHEMAS)?;
    let mut forms = txn.open_table(FORMS)?;
    let mut versions = txn.open_table(VERSIONS)?;

    for schema in staged {
        let key = version_key(&schema.name, &schema.version);
        if versions.get(key.as_str())?.is_some() {
            return Err(DuplicateVersion {
                name: schema.name.clone(),
                version: schema.version.clone(),
            }
            .into());
        }

        let mut ids = match forms.get(schema.name.as_str())? {
            Some(bytes) => decode_ids(bytes.value(), &schema.name)?,
            None => Vec::new(),
        };
        if schema.parent_id.as_ref() != ids.last() {
            return Err(StaleParent {
                name: schema.name.clone(),
                parent: schema.parent_id.clone(),
                current: ids.last().cloned(),
            }
            .into());
        }

        versions.insert(key.as_str(), schema.id.as_str())?;
        let encoded = rmp_serde::to_vec_named(schema)?;
        schemas.insert(schema.id.as_str(), encoded.as_slice())?;

        ids.push(schema.id.clone());
        let encoded = rmp_serde::to_vec_named(&ids)?;
        forms.insert(schema.name.as_str(), encoded.as_slice())?;
    }
    Ok(())
}

fn commit_staged(db: &Database, staged: &[FormSchema]) -> anyhow::Result<()> {
    let txn = db.begin_write()?;
    if let Err(e) = write_staged(&txn, staged) {
        if let Err(abort_err) = txn.abort() {
            tracing::warn!(error = %abort_err, "failed to abort schema write transaction");
        }
        return Err(e);
    }
    txn.commit()?;
    Ok(())
}

#[async_trait]
impl SchemaStore for RedbSchemaStore {
    async fn load_schema(&self, id: &SchemaId) -> anyhow::Result<Option<FormSchema>> {
        let id = id.clone();
        self.blocking(move |db| read_schema(db, id.as_str())).await
    }

    async fn current(&self, name: &str) -> anyhow::Result<Option<FormSchema>> {
        let name = name.to_string();
        self.blocking(move |db| read_current(db, &name)).await
    }

    async fn history(&self, name: &str) -> anyhow::Result<Vec<FormSchema>> {
        let name = name.to_string();
        self.blocking(move |db| read_history(db, &name)).await
    }

    async fn begin(&self) -> anyhow::Result<Box<dyn SchemaTransaction>> {
        Ok(Box::new(RedbTransaction {
            db: Arc::clone(&self.db),
            staged: Vec::new(),
        }))
    }
}

/// Transaction over a [`RedbSchemaStore`].
///
/// Writes are buffered and applied in a single redb write transaction on
/// commit, so no database lock is held while the caller works.
pub struct RedbTransaction {
    db: Arc<Database>,
    staged: Vec<FormSchema>,
}

#[async_trait]
impl SchemaTransaction for RedbTransaction {
    async fn load_schema(&mut self, id: &SchemaId) -> anyhow::Result<Option<FormSchema>> {
        if let Some(staged) = self.staged.iter().find(|s| &s.id == id) {
            return Ok(Some(staged.clone()));
        }
        let id = id.clone();
        run_blocking(Arc::clone(&self.db), move |db| read_schema(db, id.as_str())).await
    }

    async fn current(&mut self, name: &str) -> anyhow::Result<Option<FormSchema>> {
        if let Some(staged) = self.staged.iter().rev().find(|s| s.name == name) {
            return Ok(Some(staged.clone()));
        }
        let name = name.to_string();
        run_blocking(Arc::clone(&self.db), move |db| read_current(db, &name)).await
    }

    async fn save_schema(&mut self, schema: FormSchema) -> anyhow::Result<()> {
        self.staged.push(schema);
        Ok(())
    }

    async fn commit(&mut self) -> anyhow::Result<()> {
        let staged = std::mem::take(&mut self.staged);
        if staged.is_empty() {
            return Ok(());
        }
        run_blocking(Arc::clone(&self.db), move |db| commit_staged(db, &staged)).await
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        self.staged.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use formver_core::{FieldDefinition, FieldKind, ValidationRules, Value};

    use super::*;

    fn open(dir: &tempfile::TempDir) -> RedbSchemaStore {
        RedbSchemaStore::open(&RedbStoreConfig {
            path: dir.path().join("schemas.redb"),
        })
        .unwrap()
    }

    fn schema(version: &str) -> FormSchema {
        let mut rules = ValidationRules {
            max_length: Some(80),
            ..ValidationRules::default()
        };
        rules.extra.insert("locale".into(), Value::from("en"));
        FormSchema::initial(
            "signup",
            vec![
                FieldDefinition::new("name", FieldKind::Text, "Name")
                    .required()
                    .with_validation(rules),
                FieldDefinition::new("age", FieldKind::Number, "Age").with_default(Value::Int(18)),
            ],
            "tester",
        )
        .with_version(version)
    }

    async fn commit(store: &RedbSchemaStore, s: FormSchema) -> anyhow::Result<()> {
        let mut tx = store.begin().await?;
        tx.save_schema(s).await?;
        tx.commit().await
    }

    #[tokio::test]
    async fn commit_then_load_round_trips_through_msgpack() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let s = schema("1.0.0");

        commit(&store, s.clone()).await.unwrap();
        assert_eq!(store.load_schema(&s.id).await.unwrap(), Some(s.clone()));
        assert_eq!(store.current("signup").await.unwrap(), Some(s));
    }

    #[tokio::test]
    async fn empty_store_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        assert!(store.load_schema(&"nope".into()).await.unwrap().is_none());
        assert!(store.current("signup").await.unwrap().is_none());
        assert!(store.history("signup").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let v1 = schema("1.0.0");
        let v2 = v1.successor("1.1.0".into(), v1.fields.clone(), None);
        {
            let store = open(&dir);
            commit(&store, v1.clone()).await.unwrap();
            commit(&store, v2.clone()).await.unwrap();
        }

        let store = open(&dir);
        assert_eq!(store.history("signup").await.unwrap(), vec![v1, v2.clone()]);
        assert_eq!(store.current("signup").await.unwrap(), Some(v2));
    }

    #[tokio::test]
    async fn duplicate_version_aborts_whole_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let v1 = schema("1.0.0");
        commit(&store, v1.clone()).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let fresh = v1.successor("2.0.0".into(), Vec::new(), None);
        tx.save_schema(fresh.clone()).await.unwrap();
        tx.save_schema(schema("1.0.0")).await.unwrap();
        let err = tx.commit().await.unwrap_err();

        // the write error survives the abort and stays downcastable
        assert!(err.downcast_ref::<DuplicateVersion>().is_some());
        assert!(store.load_schema(&fresh.id).await.unwrap().is_none());
        assert_eq!(store.current("signup").await.unwrap(), Some(v1));
    }

    #[tokio::test]
    async fn superseded_parent_rejected_and_current_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let v1 = schema("1.0.0");
        let minor = v1.successor("1.1.0".into(), v1.fields.clone(), None);
        commit(&store, v1.clone()).await.unwrap();
        commit(&store, minor.clone()).await.unwrap();

        let patch = v1.successor("1.0.1".into(), v1.fields.clone(), None);
        let err = commit(&store, patch.clone()).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<StaleParent>(),
            Some(&StaleParent {
                name: "signup".into(),
                parent: Some(v1.id.clone()),
                current: Some(minor.id.clone()),
            })
        );
        assert!(store.load_schema(&patch.id).await.unwrap().is_none());
        assert_eq!(store.current("signup").await.unwrap(), Some(minor));
    }

    #[tokio::test]
    async fn transaction_current_sees_staged_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let v1 = schema("1.0.0");
        commit(&store, v1.clone()).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.current("signup").await.unwrap(), Some(v1.clone()));
        let v2 = v1.successor("1.0.1".into(), Vec::new(), None);
        tx.save_schema(v2.clone()).await.unwrap();
        assert_eq!(tx.current("signup").await.unwrap(), Some(v2));
        assert_eq!(store.current("signup").await.unwrap(), Some(v1));
    }

    #[tokio::test]
    async fn staged_schema_visible_inside_transaction_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let s = schema("1.0.0");

        let mut tx = store.begin().await.unwrap();
        tx.save_schema(s.clone()).await.unwrap();
        assert_eq!(tx.load_schema(&s.id).await.unwrap(), Some(s.clone()));
        assert!(store.load_schema(&s.id).await.unwrap().is_none());
        tx.rollback().await.unwrap();
        assert!(store.load_schema(&s.id).await.unwrap().is_none());
    }
}
