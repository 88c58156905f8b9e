use crate::logic::handler::{
    migrate_container_unit, MigrationAdapter, MigrationContext, UnitMigrationError, UnitOutcome,
};
use crate::logic::plan::{MigrationPlan, PlanError};
use crate::logic::script::ScriptRegistry;
use crate::model::{
    FieldValue, Id, Micronode, Release, SchemaDiffError, SchemaRegistry,
};
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;

/// Migrates micronodes referencing `from_version` inside field containers of
/// a release. The owning container keeps its own schema version; only the
/// affected micronode fields are cloned and reshaped. Micronodes bound to
/// any other microschema version keep their `Arc` identity untouched.
pub struct MicronodeMigration {
    from_version: Id,
    to_version: Id,
}

impl MicronodeMigration {
    pub fn new(from_version: Id, to_version: Id) -> Self {
        Self {
            from_version,
            to_version,
        }
    }

    fn migrate_micronode(
        &self,
        micronode: &Micronode,
        plan: &MigrationPlan,
        timeout: Duration,
    ) -> Result<Arc<Micronode>, UnitMigrationError> {
        let fields = plan.apply(micronode.fields.clone(), timeout)?;
        Ok(Arc::new(Micronode::new(self.to_version.clone(), fields)))
    }
}

#[async_trait::async_trait]
impl MigrationAdapter for MicronodeMigration {
    fn kind(&self) -> &'static str {
        "micronode"
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
            .list_micronode_containers(&release.id, &self.from_version)
            .await
    }

    async fn prepare_unit(
        &self,
        ctx: &MigrationContext<'_>,
        unit_id: &Id,
    ) -> Result<UnitOutcome, UnitMigrationError> {
        migrate_container_unit(ctx, unit_id, &|container| {
            for value in container.fields.values_mut() {
                match value {
                    FieldValue::Micronode(micronode)
                        if micronode.microschema_version == self.from_version =>
                    {
                        let migrated = self.migrate_micronode(
                            micronode.as_ref(),
                            ctx.plan,
                            ctx.script_timeout,
                        )?;
                        *value = FieldValue::Micronode(migrated);
                    }
                    FieldValue::List(items) => {
                        // Element-by-element: only micronodes on from_version
                        // get a fresh clone, siblings stay shared.
                        for item in items.iter_mut() {
                            if let FieldValue::Micronode(micronode) = item {
                                if micronode.microschema_version == self.from_version {
                                    let migrated = self.migrate_micronode(
                                        micronode.as_ref(),
                                        ctx.plan,
                                        ctx.script_timeout,
                                    )?;
                                    *item = FieldValue::Micronode(migrated);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(())
        })
        .await
    }
}
