//! Schema version orchestration.
//!
//! [`SchemaVersionManager`] is the only component that touches the store.
//! Publishing runs in one transaction per call: load the parent version,
//! derive the next version string, stage the new immutable schema, commit.
//! Any failure after `begin` rolls the transaction back before the error is
//! returned, so no partial version ever becomes visible.

use std::sync::Arc;

use formver_core::{
    diff_with_renames, increment, migrate_response, plan, plan_from_diff, validate_response,
    ChangeClass, FieldDefinition, FieldRename, FormSchema, MigrationPlan, Response, SchemaId,
    ValidationResult,
};

use crate::config::ManagerConfig;
use crate::error::{DuplicateVersion, StaleParent, VersioningError};
use crate::traits::{SchemaStore, SchemaTransaction};

/// A record that failed validation against the target schema after
/// migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Position of the record in the input.
    pub index: usize,
    pub errors: Vec<String>,
}

/// Outcome of migrating a batch of responses without persisting anything.
#[derive(Debug, Clone, Default)]
pub struct DryRunReport {
    pub migrated: Vec<Response>,
    /// Failing records, capped at `ManagerConfig::max_reported_failures`.
    pub failures: Vec<RecordFailure>,
    /// Number of failing records, including those not reported.
    pub failed_count: usize,
}

impl DryRunReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed_count == 0
    }
}

/// Publishes schema versions and exposes planning and migration.
pub struct SchemaVersionManager {
    store: Arc<dyn SchemaStore>,
    config: ManagerConfig,
}

impl SchemaVersionManager {
    #[must_use]
    pub fn new(store: Arc<dyn SchemaStore>, config: ManagerConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Persists the first version of a new form.
    ///
    /// # Errors
    ///
    /// [`VersioningError::StaleParent`] if the form already has versions,
    /// [`VersioningError::VersionConflict`] if it already has this version,
    /// [`VersioningError::Persistence`] if the store fails.
    #[tracing::instrument(skip_all, fields(name = %schema.name, version = %schema.version))]
    pub async fn register_initial(&self, schema: FormSchema) -> Result<FormSchema, VersioningError> {
        let mut tx = self.store.begin().await?;
        if let Err(e) = tx.save_schema(schema.clone()).await {
            return Err(abort(tx.as_mut(), e).await);
        }
        if let Err(e) = tx.commit().await {
            return Err(abort(tx.as_mut(), e).await);
        }
        tracing::info!(schema_id = %schema.id, "registered initial schema version");
        Ok(schema)
    }

    /// Publishes a new version derived from `schema_id`, which must be the
    /// current version of its form.
    ///
    /// The new version gets a fresh id, `new_fields`, and the version string
    /// [`increment`] derives from the parent's version and `change_class`.
    /// Name, author, and opaque payloads carry forward.
    ///
    /// # Errors
    ///
    /// - [`VersioningError::SchemaNotFound`] if `schema_id` does not exist
    /// - [`VersioningError::StaleParent`] if `schema_id` has been superseded,
    ///   either before this call or by a writer that committed first
    /// - [`VersioningError::VersionConflict`] if a concurrent writer already
    ///   published the same version of this form
    /// - [`VersioningError::Persistence`] if the store fails
    ///
    /// Nothing is retried; a retried call re-reads the parent fresh.
    #[tracing::instrument(skip(self, new_fields), fields(fields = new_fields.len()))]
    pub async fn create_new_version(
        &self,
        schema_id: &SchemaId,
        new_fields: Vec<FieldDefinition>,
        change_description: &str,
        change_class: ChangeClass,
    ) -> Result<FormSchema, VersioningError> {
        let mut tx = self.store.begin().await?;

        let parent = match tx.load_schema(schema_id).await {
            Ok(Some(schema)) => schema,
            Ok(None) => {
                release(tx.as_mut()).await;
                return Err(VersioningError::SchemaNotFound {
                    schema_id: schema_id.clone(),
                });
            }
            Err(e) => return Err(abort(tx.as_mut(), e).await),
        };

        // The store re-checks this at commit; failing here avoids staging.
        match tx.current(&parent.name).await {
            Ok(Some(head)) if head.id == parent.id => {}
            Ok(head) => {
                release(tx.as_mut()).await;
                return Err(VersioningError::StaleParent {
                    name: parent.name,
                    parent: Some(parent.id),
                    current: head.map(|h| h.id),
                });
            }
            Err(e) => return Err(abort(tx.as_mut(), e).await),
        }

        let next_version = increment(&parent.version, change_class);
        let schema = parent.successor(
            next_version,
            new_fields,
            Some(change_description.to_string()),
        );

        if let Err(e) = tx.save_schema(schema.clone()).await {
            return Err(abort(tx.as_mut(), e).await);
        }
        if let Err(e) = tx.commit().await {
            return Err(abort(tx.as_mut(), e).await);
        }

        tracing::info!(
            name = %schema.name,
            from = %parent.version,
            to = %schema.version,
            new_id = %schema.id,
            "published schema version"
        );
        Ok(schema)
    }

    /// Plans the transition between two materialized schemas.
    #[must_use]
    pub fn create_migration_plan(&self, from: &FormSchema, to: &FormSchema) -> MigrationPlan {
        let mut migration = plan(from, to);
        migration.diff.mapping_policy = self.config.mapping_policy;
        migration
    }

    /// Loads two stored versions and plans the transition between them,
    /// pairing the given renames.
    ///
    /// # Errors
    ///
    /// [`VersioningError::SchemaNotFound`] if either id is unknown,
    /// [`VersioningError::Persistence`] if the store fails.
    pub async fn plan_between(
        &self,
        from_id: &SchemaId,
        to_id: &SchemaId,
        renames: &[FieldRename],
    ) -> Result<MigrationPlan, VersioningError> {
        let from = self.load(from_id).await?;
        let to = self.load(to_id).await?;

        let mut diff = diff_with_renames(&from.fields, &to.fields, renames);
        diff.mapping_policy = self.config.mapping_policy;
        Ok(plan_from_diff(from.version, to.version, diff))
    }

    /// Loads a stored version.
    ///
    /// # Errors
    ///
    /// [`VersioningError::SchemaNotFound`] if `id` is unknown.
    pub async fn load(&self, id: &SchemaId) -> Result<FormSchema, VersioningError> {
        self.store
            .load_schema(id)
            .await?
            .ok_or_else(|| VersioningError::SchemaNotFound {
                schema_id: id.clone(),
            })
    }

    /// The current version of the form called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn current(&self, name: &str) -> Result<Option<FormSchema>, VersioningError> {
        Ok(self.store.current(name).await?)
    }

    /// Every version of the form called `name`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn history(&self, name: &str) -> Result<Vec<FormSchema>, VersioningError> {
        Ok(self.store.history(name).await?)
    }

    /// Migrates one stored response across a plan's diff.
    #[must_use]
    pub fn migrate_response(&self, response: &Response, plan: &MigrationPlan) -> Response {
        migrate_response(response, &plan.diff)
    }

    /// Migrates `responses` across `plan` and validates each result against
    /// `target`. Persists nothing.
    pub fn dry_run<'a, I>(&self, plan: &MigrationPlan, target: &FormSchema, responses: I) -> DryRunReport
    where
        I: IntoIterator<Item = &'a Response>,
    {
        let mut report = DryRunReport::default();

        for (index, response) in responses.into_iter().enumerate() {
            let migrated = migrate_response(response, &plan.diff);
            if let ValidationResult::Invalid { errors } = validate_response(&target.fields, &migrated) {
                report.failed_count += 1;
                if report.failures.len() < self.config.max_reported_failures {
                    report.failures.push(RecordFailure { index, errors });
                }
            }
            report.migrated.push(migrated);
        }

        tracing::debug!(
            records = report.migrated.len(),
            failed = report.failed_count,
            to = %target.version,
            "dry-run migration finished"
        );
        report
    }
}

/// Rolls `tx` back after `cause` and converts `cause` into the error the
/// caller sees.
async fn abort(tx: &mut dyn SchemaTransaction, cause: anyhow::Error) -> VersioningError {
    tracing::warn!(error = %cause, "schema transaction failed, rolling back");
    release(tx).await;

    let cause = match cause.downcast::<DuplicateVersion>() {
        Ok(duplicate) => return duplicate.into(),
        Err(other) => other,
    };
    match cause.downcast::<StaleParent>() {
        Ok(stale) => stale.into(),
        Err(other) => VersioningError::Persistence(other),
    }
}

async fn release(tx: &mut dyn SchemaTransaction) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "rollback failed");
    }
}
