pub mod common;
pub mod container;
pub mod field;
pub mod release;
pub mod schema;
pub mod status;

pub use common::{generate_id, ContainerType, FieldType, Id, VersionNumber};
pub use container::{FieldContainer, Node};
pub use field::{FieldMap, FieldValue, Micronode};
pub use release::Release;
pub use schema::{
    FieldChange, FieldSchema, SchemaDiffError, SchemaKind, SchemaRegistry, SchemaVersion,
    SchemaVersionChain, VersionStep,
};
pub use status::{
    CapturedError, MigrationState, MigrationStatus, NullStatusSink, SharedStatusSink, StatusSink,
};
