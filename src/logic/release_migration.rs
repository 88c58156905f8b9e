use crate::index::IndexBatch;
use crate::logic::handler::{
    MigrationAdapter, MigrationContext, UnitMigrationError, UnitOutcome,
};
use crate::logic::plan::{MigrationPlan, PlanError};
use crate::logic::script::ScriptRegistry;
use crate::model::{ContainerType, Id, Release, SchemaRegistry};
use crate::store::{Store, UnitCommit};

/// Runs after a release fork: registers the previous release's current
/// draft/published containers for the new release and indexes them under the
/// new release scope. Containers are shared between releases until edited,
/// so each unit is a pointer write, never a clone, and no plan is applied.
pub struct ReleaseMigration {
    previous_release: Id,
}

impl ReleaseMigration {
    pub fn new(previous_release: Id) -> Self {
        Self { previous_release }
    }
}

#[async_trait::async_trait]
impl MigrationAdapter for ReleaseMigration {
    fn kind(&self) -> &'static str {
        "release"
    }

    fn compile_plan(
        &self,
        _registry: &SchemaRegistry,
        _scripts: &ScriptRegistry,
    ) -> Result<MigrationPlan, PlanError> {
        Ok(MigrationPlan::identity())
    }

    async fn enumerate(&self, store: &dyn Store, _release: &Release) -> anyhow::Result<Vec<Id>> {
        store.list_current_drafts(&self.previous_release).await
    }

    async fn prepare_unit(
        &self,
        ctx: &MigrationContext<'_>,
        unit_id: &Id,
    ) -> Result<UnitOutcome, UnitMigrationError> {
        let container = ctx
            .store
            .get_container(unit_id)
            .await?
            .ok_or_else(|| UnitMigrationError::MissingContainer(unit_id.clone()))?;
        let new_release = &ctx.release.id;

        let mut commit = UnitCommit::new();
        let mut batch = IndexBatch::new();

        commit.repoint(
            container.node_id.clone(),
            container.language.clone(),
            new_release.clone(),
            ContainerType::Draft,
            container.id.clone(),
        );
        batch.store_in(&container, new_release, ContainerType::Draft);

        if let Some(published) = ctx
            .store
            .current_container(
                &container.node_id,
                &container.language,
                &self.previous_release,
                ContainerType::Published,
            )
            .await?
        {
            commit.repoint(
                published.node_id.clone(),
                published.language.clone(),
                new_release.clone(),
                ContainerType::Published,
                published.id.clone(),
            );
            batch.store_in(&published, new_release, ContainerType::Published);
        }

        Ok(UnitOutcome { commit, batch })
    }
}
