pub mod handler;
pub mod micronode_migration;
pub mod node_migration;
pub mod plan;
pub mod release_migration;
pub mod release_ops;
pub mod script;

pub use handler::{
    CancelFlag, MigrationAdapter, MigrationContext, MigrationError, MigrationHandler,
    MigrationReport, UnitMigrationError, UnitOutcome,
};
pub use micronode_migration::MicronodeMigration;
pub use node_migration::NodeMigration;
pub use plan::{coerce, FieldTransform, MigrationPlan, PlanError};
pub use release_migration::ReleaseMigration;
pub use release_ops::ReleaseOperations;
pub use script::{ScriptError, ScriptRegistry, TransformScript};
