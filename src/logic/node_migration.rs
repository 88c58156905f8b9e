use crate::logic::handler::{
    migrate_container_unit, MigrationAdapter, MigrationContext, UnitMigrationError, UnitOutcome,
};
use crate::logic::plan::{MigrationPlan, PlanError};
use crate::logic::script::ScriptRegistry;
use crate::model::{Id, Release, SchemaDiffError, SchemaRegistry};
use crate::store::Store;

/// Migrates every field container bound to `from_version` within a release
/// onto `to_version`, reshaping the container's own fields with the compiled
/// plan. Micronodes inside the container stay shared by reference; they are
/// the micronode adapter's concern.
pub struct NodeMigration {
    from_version: Id,
    to_version: Id,
}

impl NodeMigration {
    pub fn new(from_version: Id, to_version: Id) -> Self {
        Self {
            from_version,
            to_version,
        }
    }
}

#[async_trait::async_trait]
impl MigrationAdapter for NodeMigration {
    fn kind(&self) -> &'static str {
        "node"
    }

    fn compile_plan(
        &self,
        registry: &SchemaRegistry,
        scripts: &ScriptRegistry,
    ) -> Result<MigrationPlan, PlanError> {
        let (chain, _) = registry
            .find_version(&self.from_version)
            .ok_or_else(|| SchemaDiffError::UnknownVersion(self.from_version.clone()))?;
        MigrationPlan::compile(chain, &self.from_version, &self.to_version, scripts)
    }

    async fn enumerate(&self, store: &dyn Store, release: &Release) -> anyhow::Result<Vec<Id>> {
        store
            .list_containers_for_version(&release.id, &self.from_version)
            .await
    }

    async fn prepare_unit(
        &self,
        ctx: &MigrationContext<'_>,
        unit_id: &Id,
    ) -> Result<UnitOutcome, UnitMigrationError> {
        migrate_container_unit(ctx, unit_id, &|container| {
            container.schema_version = self.to_version.clone();
            let fields = std::mem::take(&mut container.fields);
            container.fields = ctx.plan.apply(fields, ctx.script_timeout)?;
            Ok(())
        })
        .await
    }
}
