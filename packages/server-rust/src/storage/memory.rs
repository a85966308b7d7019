//! In-memory [`SchemaStore`] implementation.
//!
//! Versions live in an append-only arena; per-form "current" pointers and
//! the `(name, version)` uniqueness set are indices into it. All of them sit
//! behind one lock so a commit publishes a version and moves the pointer in
//! a single step.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use formver_core::{FormSchema, SchemaId};
use parking_lot::RwLock;

use crate::error::{DuplicateVersion, StaleParent};
use crate::traits::{SchemaStore, SchemaTransaction};

#[derive(Debug, Default)]
struct Arena {
    versions: Vec<FormSchema>,
    by_id: HashMap<SchemaId, usize>,
    /// name -> slots, oldest first. The last slot is the current version.
    by_name: HashMap<String, Vec<usize>>,
    taken: HashSet<(String, String)>,
}

impl Arena {
    fn get(&self, id: &SchemaId) -> Option<&FormSchema> {
        self.by_id.get(id).map(|&slot| &self.versions[slot])
    }

    fn current(&self, name: &str) -> Option<&FormSchema> {
        self.by_name
            .get(name)
            .and_then(|slots| slots.last())
            .map(|&slot| &self.versions[slot])
    }

    /// Rejects `staged` unless every version is new and extends the current
    /// version of its form, applying the batch in order.
    fn check_staged(&self, staged: &[FormSchema]) -> anyhow::Result<()> {
        let mut pending = HashSet::new();
        let mut heads: HashMap<&str, Option<&SchemaId>> = HashMap::new();

        for schema in staged {
            let key = (schema.name.clone(), schema.version.clone());
            if self.taken.contains(&key) || !pending.insert(key) {
                return Err(DuplicateVersion {
                    name: schema.name.clone(),
                    version: schema.version.clone(),
                }
                .into());
            }

            let head = *heads
                .entry(schema.name.as_str())
                .or_insert_with(|| self.current(&schema.name).map(|c| &c.id));
            if schema.parent_id.as_ref() != head {
                return Err(StaleParent {
                    name: schema.name.clone(),
                    parent: schema.parent_id.clone(),
                    current: head.cloned(),
                }
                .into());
            }
            heads.insert(schema.name.as_str(), Some(&schema.id));
        }
        Ok(())
    }

    fn push(&mut self, schema: FormSchema) {
        let slot = self.versions.len();
        self.taken
            .insert((schema.name.clone(), schema.version.clone()));
        self.by_id.insert(schema.id.clone(), slot);
        self.by_name
            .entry(schema.name.clone())
            .or_default()
            .push(slot);
        self.versions.push(schema);
    }
}

/// Schema store held entirely in memory.
///
/// Cloning is cheap and clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemorySchemaStore {
    arena: Arc<RwLock<Arena>>,
}

impl InMemorySchemaStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed versions across all forms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.read().versions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SchemaStore for InMemorySchemaStore {
    async fn load_schema(&self, id: &SchemaId) -> anyhow::Result<Option<FormSchema>> {
        Ok(self.arena.read().get(id).cloned())
    }

    async fn current(&self, name: &str) -> anyhow::Result<Option<FormSchema>> {
        Ok(self.arena.read().current(name).cloned())
    }

    async fn history(&self, name: &str) -> anyhow::Result<Vec<FormSchema>> {
        let arena = self.arena.read();
        Ok(arena
            .by_name
            .get(name)
            .map(|slots| slots.iter().map(|&s| arena.versions[s].clone()).collect())
            .unwrap_or_default())
    }

    async fn begin(&self) -> anyhow::Result<Box<dyn SchemaTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            arena: Arc::clone(&self.arena),
            staged: Vec::new(),
        }))
    }
}

/// Transaction over an [`InMemorySchemaStore`]. Buffers writes until commit.
pub struct InMemoryTransaction {
    arena: Arc<RwLock<Arena>>,
    staged: Vec<FormSchema>,
}

#[async_trait]
impl SchemaTransaction for InMemoryTransaction {
    async fn load_schema(&mut self, id: &SchemaId) -> anyhow::Result<Option<FormSchema>> {
        if let Some(staged) = self.staged.iter().find(|s| &s.id == id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.arena.read().get(id).cloned())
    }

    async fn current(&mut self, name: &str) -> anyhow::Result<Option<FormSchema>> {
        if let Some(staged) = self.staged.iter().rev().find(|s| s.name == name) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.arena.read().current(name).cloned())
    }

    async fn save_schema(&mut self, schema: FormSchema) -> anyhow::Result<()> {
        self.staged.push(schema);
        Ok(())
    }

    async fn commit(&mut self) -> anyhow::Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let mut arena = self.arena.write();
        arena.check_staged(&staged)?;

        for schema in staged {
            arena.push(schema);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        self.staged.clear();
        Ok(())
    }
}
