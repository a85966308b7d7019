//! End-to-end publishing and migration through `SchemaVersionManager`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use formver_core::{
    ChangeClass, FieldDefinition, FieldKind, FormSchema, Response, SchemaId, Value,
};
use formver_server::{
    InMemorySchemaStore, ManagerConfig, SchemaStore, SchemaTransaction, SchemaVersionManager,
    VersioningError,
};
use tokio::sync::Barrier;

/// Delegates to an in-memory store but fails every commit.
struct FailingCommitStore {
    inner: InMemorySchemaStore,
    rollbacks: Arc<AtomicUsize>,
}

struct FailingCommitTx {
    inner: Box<dyn SchemaTransaction>,
    rollbacks: Arc<AtomicUsize>,
}

#[async_trait]
impl SchemaStore for FailingCommitStore {
    async fn load_schema(&self, id: &SchemaId) -> anyhow::Result<Option<FormSchema>> {
        self.inner.load_schema(id).await
    }

    async fn current(&self, name: &str) -> anyhow::Result<Option<FormSchema>> {
        self.inner.current(name).await
    }

    async fn history(&self, name: &str) -> anyhow::Result<Vec<FormSchema>> {
        self.inner.history(name).await
    }

    async fn begin(&self) -> anyhow::Result<Box<dyn SchemaTransaction>> {
        Ok(Box::new(FailingCommitTx {
            inner: self.inner.begin().await?,
            rollbacks: Arc::clone(&self.rollbacks),
        }))
    }
}

#[async_trait]
impl SchemaTransaction for FailingCommitTx {
    async fn load_schema(&mut self, id: &SchemaId) -> anyhow::Result<Option<FormSchema>> {
        self.inner.load_schema(id).await
    }

    async fn current(&mut self, name: &str) -> anyhow::Result<Option<FormSchema>> {
        self.inner.current(name).await
    }

    async fn save_schema(&mut self, schema: FormSchema) -> anyhow::Result<()> {
        self.inner.save_schema(schema).await
    }

    async fn commit(&mut self) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback().await
    }
}

/// Holds every writer at its current-version check until all of them have
/// read it, so they all pass it and race at commit.
struct LockstepStore {
    inner: InMemorySchemaStore,
    barrier: Arc<Barrier>,
}

struct LockstepTx {
    inner: Box<dyn SchemaTransaction>,
    barrier: Arc<Barrier>,
}

#[async_trait]
impl SchemaStore for LockstepStore {
    async fn load_schema(&self, id: &SchemaId) -> anyhow::Result<Option<FormSchema>> {
        self.inner.load_schema(id).await
    }

    async fn current(&self, name: &str) -> anyhow::Result<Option<FormSchema>> {
        self.inner.current(name).await
    }

    async fn history(&self, name: &str) -> anyhow::Result<Vec<FormSchema>> {
        self.inner.history(name).await
    }

    async fn begin(&self) -> anyhow::Result<Box<dyn SchemaTransaction>> {
        Ok(Box::new(LockstepTx {
            inner: self.inner.begin().await?,
            barrier: Arc::clone(&self.barrier),
        }))
    }
}

#[async_trait]
impl SchemaTransaction for LockstepTx {
    async fn load_schema(&mut self, id: &SchemaId) -> anyhow::Result<Option<FormSchema>> {
        self.inner.load_schema(id).await
    }

    async fn current(&mut self, name: &str) -> anyhow::Result<Option<FormSchema>> {
        let head = self.inner.current(name).await?;
        self.barrier.wait().await;
        Ok(head)
    }

    async fn save_schema(&mut self, schema: FormSchema) -> anyhow::Result<()> {
        self.inner.save_schema(schema).await
    }

    async fn commit(&mut self) -> anyhow::Result<()> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        self.inner.rollback().await
    }
}

fn field(id: &str, kind: FieldKind) -> FieldDefinition {
    FieldDefinition::new(id, kind, id)
}

fn record(entries: &[(&str, Value)]) -> Response {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn failed_commit_leaves_previous_version_current() {
    let inner = InMemorySchemaStore::new();
    let seed = SchemaVersionManager::new(Arc::new(inner.clone()), ManagerConfig::default());
    let v1 = seed
        .register_initial(FormSchema::initial("survey", vec![field("q1", FieldKind::Text)], "ops"))
        .await
        .unwrap();

    let rollbacks = Arc::new(AtomicUsize::new(0));
    let failing = SchemaVersionManager::new(
        Arc::new(FailingCommitStore {
            inner: inner.clone(),
            rollbacks: Arc::clone(&rollbacks),
        }),
        ManagerConfig::default(),
    );

    let err = failing
        .create_new_version(&v1.id, Vec::new(), "drop q1", ChangeClass::Major)
        .await
        .unwrap_err();

    assert!(matches!(err, VersioningError::Persistence(_)));
    assert!(err.to_string().contains("disk full"));
    assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(seed.current("survey").await.unwrap(), Some(v1));
    assert_eq!(inner.len(), 1);
}

#[tokio::test]
async fn missing_parent_rolls_back_and_reports_not_found() {
    let rollbacks = Arc::new(AtomicUsize::new(0));
    let manager = SchemaVersionManager::new(
        Arc::new(FailingCommitStore {
            inner: InMemorySchemaStore::new(),
            rollbacks: Arc::clone(&rollbacks),
        }),
        ManagerConfig::default(),
    );

    let err = manager
        .create_new_version(&SchemaId::from("ghost"), Vec::new(), "x", ChangeClass::Minor)
        .await
        .unwrap_err();
    assert!(matches!(err, VersioningError::SchemaNotFound { .. }));
    assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn version_chain_follows_change_classes() {
    let manager =
        SchemaVersionManager::new(Arc::new(InMemorySchemaStore::new()), ManagerConfig::default());
    let v1 = manager
        .register_initial(
            FormSchema::initial("intake", vec![field("name", FieldKind::Text)], "ops")
                .with_version("1.2.3"),
        )
        .await
        .unwrap();

    let patch = manager
        .create_new_version(&v1.id, v1.fields.clone(), "typo", ChangeClass::Patch)
        .await
        .unwrap();
    let minor = manager
        .create_new_version(
            &patch.id,
            vec![field("name", FieldKind::Text), field("age", FieldKind::Number)],
            "add age",
            ChangeClass::Minor,
        )
        .await
        .unwrap();
    let major = manager
        .create_new_version(
            &minor.id,
            vec![field("age", FieldKind::Number)],
            "drop name",
            ChangeClass::Major,
        )
        .await
        .unwrap();

    let versions: Vec<String> = manager
        .history("intake")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.version)
        .collect();
    assert_eq!(versions, ["1.2.3", "1.2.4", "1.3.0", "2.0.0"]);
    assert_eq!(manager.current("intake").await.unwrap(), Some(major));
}

#[tokio::test]
async fn concurrent_publishers_from_one_parent_conflict() {
    let manager = Arc::new(SchemaVersionManager::new(
        Arc::new(InMemorySchemaStore::new()),
        ManagerConfig::default(),
    ));
    let v1 = manager
        .register_initial(FormSchema::initial("race", Vec::new(), "ops"))
        .await
        .unwrap();

    let classes = [
        ChangeClass::Minor,
        ChangeClass::Patch,
        ChangeClass::Major,
        ChangeClass::Minor,
    ];
    let tasks: Vec<_> = classes
        .into_iter()
        .enumerate()
        .map(|(i, class)| {
            let manager = Arc::clone(&manager);
            let parent = v1.id.clone();
            tokio::spawn(async move {
                manager
                    .create_new_version(
                        &parent,
                        vec![field(&format!("f{i}"), FieldKind::Text)],
                        "add field",
                        class,
                    )
                    .await
            })
        })
        .collect();

    let mut published = Vec::new();
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(schema) => published.push(schema),
            Err(VersioningError::VersionConflict { .. } | VersioningError::StaleParent { .. }) => {
                rejected += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((published.len(), rejected), (1, 3));
    assert_eq!(manager.history("race").await.unwrap().len(), 2);
    assert_eq!(manager.current("race").await.unwrap(), published.pop());
}

#[tokio::test]
async fn writers_racing_past_the_head_check_are_rejected_at_commit() {
    let inner = InMemorySchemaStore::new();
    let seed = SchemaVersionManager::new(Arc::new(inner.clone()), ManagerConfig::default());
    let v1 = seed
        .register_initial(FormSchema::initial("race", Vec::new(), "ops"))
        .await
        .unwrap();

    let manager = Arc::new(SchemaVersionManager::new(
        Arc::new(LockstepStore {
            inner: inner.clone(),
            barrier: Arc::new(Barrier::new(2)),
        }),
        ManagerConfig::default(),
    ));

    // different classes give different version strings, so only the
    // parent check can tell the writers apart
    let spawn = |class: ChangeClass| {
        let manager = Arc::clone(&manager);
        let parent = v1.id.clone();
        tokio::spawn(async move {
            manager
                .create_new_version(&parent, Vec::new(), "edit", class)
                .await
        })
    };
    let minor = spawn(ChangeClass::Minor);
    let patch = spawn(ChangeClass::Patch);
    let results = [minor.await.unwrap(), patch.await.unwrap()];

    let winners: Vec<&FormSchema> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(
        loser,
        VersioningError::StaleParent { current: Some(id), .. } if *id == winners[0].id
    ));

    assert_eq!(inner.len(), 2);
    assert_eq!(seed.current("race").await.unwrap().as_ref(), Some(winners[0]));
}

#[tokio::test]
async fn current_never_moves_backward_across_stale_writes() {
    let manager =
        SchemaVersionManager::new(Arc::new(InMemorySchemaStore::new()), ManagerConfig::default());
    let v1 = manager
        .register_initial(FormSchema::initial("survey", Vec::new(), "ops"))
        .await
        .unwrap();
    let v2 = manager
        .create_new_version(&v1.id, Vec::new(), "minor", ChangeClass::Minor)
        .await
        .unwrap();

    for class in [ChangeClass::Patch, ChangeClass::Minor, ChangeClass::Major] {
        let err = manager
            .create_new_version(&v1.id, Vec::new(), "stale", class)
            .await
            .unwrap_err();
        assert!(matches!(err, VersioningError::StaleParent { .. }), "{class}: {err}");
        assert_eq!(manager.current("survey").await.unwrap(), Some(v2.clone()));
    }

    let v3 = manager
        .create_new_version(&v2.id, Vec::new(), "from head", ChangeClass::Patch)
        .await
        .unwrap();
    assert_eq!(v3.version, "1.1.1");
    assert_eq!(manager.current("survey").await.unwrap(), Some(v3));
}

#[tokio::test]
async fn plan_and_migrate_removed_and_added_fields() {
    let manager =
        SchemaVersionManager::new(Arc::new(InMemorySchemaStore::new()), ManagerConfig::default());
    let v1 = manager
        .register_initial(FormSchema::initial(
            "contact",
            vec![
                field("field1", FieldKind::Text),
                field("field2", FieldKind::Text),
                field("field3", FieldKind::Text),
            ],
            "ops",
        ))
        .await
        .unwrap();
    let v2 = manager
        .create_new_version(
            &v1.id,
            vec![
                field("field1", FieldKind::Text),
                field("field2", FieldKind::Text),
                field("field4", FieldKind::Text).with_default("default"),
            ],
            "swap field3 for field4",
            ChangeClass::Major,
        )
        .await
        .unwrap();

    let plan = manager.create_migration_plan(&v1, &v2);
    assert_eq!((plan.from_version.as_str(), plan.to_version.as_str()), ("1.0.0", "2.0.0"));
    assert!(!plan.backward_compatible);
    assert!(plan.data_migration_required);
    assert_eq!(
        plan.warnings,
        [
            "This migration contains breaking changes",
            "Data for 1 fields will be lost",
        ]
    );

    let old = record(&[
        ("field1", Value::from("v1")),
        ("field2", Value::from("v2")),
        ("field3", Value::from("v3")),
    ]);
    let report = manager.dry_run(&plan, &v2, [&old]);
    assert!(report.is_clean());
    assert_eq!(
        report.migrated,
        vec![record(&[
            ("field1", Value::from("v1")),
            ("field2", Value::from("v2")),
            ("field4", Value::from("default")),
        ])]
    );
}

#[cfg(feature = "redb")]
#[tokio::test]
async fn redb_store_survives_reopen() {
    use formver_server::{RedbSchemaStore, RedbStoreConfig};

    let dir = tempfile::tempdir().unwrap();
    let config = RedbStoreConfig {
        path: dir.path().join("schemas.redb"),
    };

    let v2 = {
        let manager = SchemaVersionManager::new(
            Arc::new(RedbSchemaStore::open(&config).unwrap()),
            ManagerConfig::default(),
        );
        let v1 = manager
            .register_initial(FormSchema::initial("durable", Vec::new(), "ops"))
            .await
            .unwrap();
        manager
            .create_new_version(&v1.id, vec![field("x", FieldKind::Checkbox)], "add x", ChangeClass::Minor)
            .await
            .unwrap()
    };

    let reopened = SchemaVersionManager::new(
        Arc::new(RedbSchemaStore::open(&config).unwrap()),
        ManagerConfig::default(),
    );
    assert_eq!(reopened.current("durable").await.unwrap(), Some(v2));
    assert_eq!(reopened.history("durable").await.unwrap().len(), 2);
}
