pub mod config;
pub mod index;
pub mod logic;
pub mod model;
pub mod store;

// Export logic types
pub use logic::{
    CancelFlag, MicronodeMigration, MigrationAdapter, MigrationError, MigrationHandler,
    MigrationPlan, MigrationReport, NodeMigration, PlanError, ReleaseMigration,
    ReleaseOperations, ScriptRegistry, TransformScript, UnitMigrationError,
};

// Export all model types
pub use model::*;

// Export index types
pub use index::{IndexBatch, IndexOp, RecordingSearchProvider, SearchProvider};

// Export store types
pub use store::{InMemoryStore, Store, UnitCommit};
