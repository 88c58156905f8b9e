use crate::config::MigrationConfig;
use crate::index::{IndexApplyError, IndexBatch, SearchProvider};
use crate::logic::plan::{MigrationPlan, PlanError};
use crate::logic::script::{ScriptError, ScriptRegistry};
use crate::model::{
    generate_id, CapturedError, ContainerType, FieldContainer, Id, MigrationState,
    MigrationStatus, Release, SchemaRegistry, StatusSink,
};
use crate::store::{Store, UnitCommit};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation for a migration run, checked between units. An
/// aborted run keeps every already-migrated unit; there is no compensating
/// rollback.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Failure of a single migration unit. Aborts only that unit's transaction;
/// the run records it and continues.
#[derive(Debug, thiserror::Error)]
pub enum UnitMigrationError {
    #[error("container '{0}' not found")]
    MissingContainer(Id),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Final result of a whole migration run.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("release '{0}' not found")]
    UnknownRelease(Id),
    #[error("{} of {total} migration units failed", .errors.len())]
    Units {
        total: u64,
        errors: Vec<CapturedError>,
    },
    #[error("migration cancelled after {completed} of {total} units")]
    Cancelled { completed: u64, total: u64 },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Successful run summary. Index failures are carried here because they do
/// not make the run fail; the index is a rebuildable projection.
#[derive(Debug)]
pub struct MigrationReport {
    pub run_id: Id,
    pub completed: u64,
    pub index_errors: Vec<IndexApplyError>,
}

/// Everything an adapter needs while preparing one unit.
pub struct MigrationContext<'a> {
    pub store: &'a dyn Store,
    pub release: &'a Release,
    pub plan: &'a MigrationPlan,
    pub script_timeout: Duration,
}

/// Write set plus index mutations of one prepared unit.
pub struct UnitOutcome {
    pub commit: UnitCommit,
    pub batch: IndexBatch,
}

/// Entity-specific capabilities injected into the one concrete
/// [`MigrationHandler`]: node-container migration, micronode migration and
/// release-creation migration each provide an implementation.
#[async_trait::async_trait]
pub trait MigrationAdapter: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Compile the reusable plan for this run. Called once, after
    /// enumeration found work; failure aborts the run with zero side
    /// effects.
    fn compile_plan(
        &self,
        registry: &SchemaRegistry,
        scripts: &ScriptRegistry,
    ) -> Result<MigrationPlan, PlanError>;

    /// Ids of all units eligible for this run within the release scope.
    async fn enumerate(&self, store: &dyn Store, release: &Release) -> anyhow::Result<Vec<Id>>;

    /// Prepare one unit's write set. Reads only; the handler owns the
    /// commit and the index application.
    async fn prepare_unit(
        &self,
        ctx: &MigrationContext<'_>,
        unit_id: &Id,
    ) -> Result<UnitOutcome, UnitMigrationError>;
}

/// The migration orchestrator: one logical worker per run, units processed
/// sequentially, plan compiled once, status pushed on every mutation and
/// persisted every `status_commit_interval` units.
pub struct MigrationHandler {
    store: Arc<dyn Store>,
    index: Arc<dyn SearchProvider>,
    registry: Arc<SchemaRegistry>,
    scripts: Arc<ScriptRegistry>,
    config: MigrationConfig,
}

impl MigrationHandler {
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<dyn SearchProvider>,
        registry: Arc<SchemaRegistry>,
        scripts: Arc<ScriptRegistry>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            store,
            index,
            registry,
            scripts,
            config,
        }
    }

    /// Run one migration. Per-unit failures are captured and the run
    /// continues; the result is an aggregate error when any unit failed.
    pub async fn migrate(
        &self,
        adapter: &dyn MigrationAdapter,
        release_id: &Id,
        sink: &dyn StatusSink,
        cancel: &CancelFlag,
    ) -> Result<MigrationReport, MigrationError> {
        let release = self
            .store
            .get_release(release_id)
            .await?
            .ok_or_else(|| MigrationError::UnknownRelease(release_id.clone()))?;

        let run_id = generate_id();
        let mut status = MigrationStatus::queued();
        sink.update(&status);

        let units = adapter.enumerate(&*self.store, &release).await?;
        if units.is_empty() {
            // Nothing to migrate: zero cost, storage untouched.
            log::info!(
                "{} migration for release '{}': no eligible units",
                adapter.kind(),
                release.name
            );
            status.state = MigrationState::Completed;
            sink.update(&status);
            return Ok(MigrationReport {
                run_id,
                completed: 0,
                index_errors: Vec::new(),
            });
        }

        // Compile once; a bad plan must not touch a single container.
        let plan = adapter.compile_plan(&self.registry, &self.scripts)?;

        status.total = units.len() as u64;
        status.state = MigrationState::Running;
        sink.update(&status);
        self.store.persist_status(&run_id, &status).await?;
        log::info!(
            "{} migration for release '{}': {} units",
            adapter.kind(),
            release.name,
            units.len()
        );

        let ctx = MigrationContext {
            store: &*self.store,
            release: &release,
            plan: &plan,
            script_timeout: self.config.script_timeout(),
        };

        let mut index_errors = Vec::new();
        let mut deferred = IndexBatch::new();
        for (processed, unit_id) in units.iter().enumerate() {
            if cancel.is_cancelled() {
                // Units already committed keep their index updates.
                if !deferred.is_empty() {
                    index_errors.extend(deferred.apply(&*self.index).await);
                }
                log::warn!(
                    "{} migration for release '{}' cancelled after {} units",
                    adapter.kind(),
                    release.name,
                    status.completed
                );
                status.state = MigrationState::Failed;
                sink.update(&status);
                self.store.persist_status(&run_id, &status).await?;
                return Err(MigrationError::Cancelled {
                    completed: status.completed,
                    total: status.total,
                });
            }

            log::debug!("migrating unit '{}'", unit_id);
            let unit_result = match adapter.prepare_unit(&ctx, unit_id).await {
                // The single commit call is the unit's transaction; an error
                // here means nothing of the unit was written.
                Ok(outcome) => match self.store.commit_unit(outcome.commit).await {
                    Ok(()) => Ok(outcome.batch),
                    Err(e) => Err(UnitMigrationError::Storage(e)),
                },
                Err(e) => Err(e),
            };

            match unit_result {
                Ok(batch) => {
                    status.completed += 1;
                    if self.config.synchronous_index_apply {
                        index_errors.extend(batch.apply(&*self.index).await);
                    } else {
                        deferred.merge(batch);
                    }
                }
                Err(e) => {
                    log::error!("error while migrating unit '{}': {}", unit_id, e);
                    status.errors.push(CapturedError {
                        unit_id: unit_id.clone(),
                        message: e.to_string(),
                    });
                }
            }
            sink.update(&status);

            let processed = processed as u64 + 1;
            if processed % self.config.status_commit_interval == 0 {
                log::info!(
                    "migrated {} of {} units ({} errors)",
                    processed,
                    status.total,
                    status.errors.len()
                );
                self.store.persist_status(&run_id, &status).await?;
            }
        }

        if !deferred.is_empty() {
            index_errors.extend(deferred.apply(&*self.index).await);
        }
        if !index_errors.is_empty() {
            log::warn!(
                "{} index operations failed during migration; the index can be rebuilt",
                index_errors.len()
            );
        }

        status.state = if status.errors.is_empty() {
            MigrationState::Completed
        } else {
            MigrationState::Failed
        };
        sink.update(&status);
        self.store.persist_status(&run_id, &status).await?;
        log::info!(
            "{} migration for release '{}' done: {} migrated, {} errors",
            adapter.kind(),
            release.name,
            status.completed,
            status.errors.len()
        );

        if status.errors.is_empty() {
            Ok(MigrationReport {
                run_id,
                completed: status.completed,
                index_errors,
            })
        } else {
            Err(MigrationError::Units {
                total: status.total,
                errors: status.errors,
            })
        }
    }
}

/// The per-unit migrate-clone-index cycle shared by the node and micronode
/// adapters. `mutate` reshapes a cloned container (reassigning its schema
/// version and/or rewriting fields); the draft/published handling, pointer
/// updates and index ops are the same for both.
pub(crate) async fn migrate_container_unit(
    ctx: &MigrationContext<'_>,
    container_id: &Id,
    mutate: &(dyn Fn(&mut FieldContainer) -> Result<(), UnitMigrationError> + Sync),
) -> Result<UnitOutcome, UnitMigrationError> {
    let container = ctx
        .store
        .get_container(container_id)
        .await?
        .ok_or_else(|| UnitMigrationError::MissingContainer(container_id.clone()))?;
    let release_id = &ctx.release.id;

    let mut commit = UnitCommit::new();
    let mut batch = IndexBatch::new();

    let current_published = ctx
        .store
        .current_container(
            &container.node_id,
            &container.language,
            release_id,
            ContainerType::Published,
        )
        .await?;
    let is_published = current_published
        .as_ref()
        .map(|p| p.id == container.id)
        .unwrap_or(false);

    let mut bumped_published = None;
    if !is_published {
        // The draft advanced past an older publish: migrate the published
        // container too, so draft and published never diverge in schema
        // version.
        if let Some(old_published) = current_published {
            let next_published = old_published.version.next_published();
            let mut migrated = old_published.clone_for_migration(next_published);
            mutate(&mut migrated)?;
            commit.repoint(
                migrated.node_id.clone(),
                migrated.language.clone(),
                release_id.clone(),
                ContainerType::Published,
                migrated.id.clone(),
            );
            batch.store_in(&migrated, release_id, ContainerType::Published);
            commit.add_container(migrated);
            bumped_published = Some(next_published);
        }
    }

    let next_version = if is_published {
        container.version.next_published()
    } else {
        let next = container.version.next_draft();
        // The published bump must not overtake the draft's number.
        match bumped_published {
            Some(published) if published >= next => published.next_draft(),
            _ => next,
        }
    };
    let mut migrated = container.clone_for_migration(next_version);
    mutate(&mut migrated)?;

    commit.repoint(
        migrated.node_id.clone(),
        migrated.language.clone(),
        release_id.clone(),
        ContainerType::Draft,
        migrated.id.clone(),
    );
    batch.store_in(&migrated, release_id, ContainerType::Draft);
    if is_published {
        commit.repoint(
            migrated.node_id.clone(),
            migrated.language.clone(),
            release_id.clone(),
            ContainerType::Published,
            migrated.id.clone(),
        );
        batch.store_in(&migrated, release_id, ContainerType::Published);
    }
    commit.add_container(migrated);

    Ok(UnitOutcome { commit, batch })
}
