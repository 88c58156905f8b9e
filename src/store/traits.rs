use crate::model::{
    ContainerType, FieldContainer, Id, MigrationStatus, Node, Release, SchemaKind,
};
use anyhow::Result;

/// Repoints a node's current draft/published marker for one language and
/// release scope.
#[derive(Debug, Clone, PartialEq)]
pub struct PointerUpdate {
    pub node_id: Id,
    pub language: String,
    pub release_id: Id,
    pub container_type: ContainerType,
    pub container_id: Id,
}

/// Write set of one migration unit. Prepared without touching storage, then
/// applied atomically through [`ContainerStore::commit_unit`]; that single
/// call is the unit's transaction boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitCommit {
    pub new_containers: Vec<FieldContainer>,
    pub pointer_updates: Vec<PointerUpdate>,
}

impl UnitCommit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&mut self, container: FieldContainer) {
        self.new_containers.push(container);
    }

    pub fn repoint(
        &mut self,
        node_id: Id,
        language: impl Into<String>,
        release_id: Id,
        container_type: ContainerType,
        container_id: Id,
    ) {
        self.pointer_updates.push(PointerUpdate {
            node_id,
            language: language.into(),
            release_id,
            container_type,
            container_id,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.new_containers.is_empty() && self.pointer_updates.is_empty()
    }
}

#[async_trait::async_trait]
pub trait ReleaseStore: Send + Sync {
    async fn get_release(&self, id: &Id) -> Result<Option<Release>>;
    async fn list_releases(&self) -> Result<Vec<Release>>;
    async fn upsert_release(&self, release: Release) -> Result<()>;
    /// Atomically replace the assigned version for (release, schema) and
    /// clear the release's migrated flag. Never triggers migration itself.
    async fn assign_schema_version(
        &self,
        release_id: &Id,
        kind: SchemaKind,
        schema_name: &str,
        version_id: &Id,
    ) -> Result<Release>;
}

#[async_trait::async_trait]
pub trait ContainerStore: Send + Sync {
    async fn get_node(&self, id: &Id) -> Result<Option<Node>>;
    async fn upsert_node(&self, node: Node) -> Result<()>;
    async fn get_container(&self, id: &Id) -> Result<Option<FieldContainer>>;
    /// The container a node's current draft/published marker points at for
    /// one language within one release scope.
    async fn current_container(
        &self,
        node_id: &Id,
        language: &str,
        release_id: &Id,
        container_type: ContainerType,
    ) -> Result<Option<FieldContainer>>;
    /// Current draft containers within the release bound to the given schema
    /// version.
    async fn list_containers_for_version(
        &self,
        release_id: &Id,
        schema_version: &Id,
    ) -> Result<Vec<Id>>;
    /// Current draft containers within the release holding at least one
    /// micronode (single field or list element) bound to the given
    /// microschema version.
    async fn list_micronode_containers(
        &self,
        release_id: &Id,
        microschema_version: &Id,
    ) -> Result<Vec<Id>>;
    /// Every current draft container within the release, regardless of
    /// schema version.
    async fn list_current_drafts(&self, release_id: &Id) -> Result<Vec<Id>>;
    /// Apply one unit's write set atomically.
    async fn commit_unit(&self, commit: UnitCommit) -> Result<()>;
}

#[async_trait::async_trait]
pub trait StatusStore: Send + Sync {
    async fn persist_status(&self, run_id: &Id, status: &MigrationStatus) -> Result<()>;
    async fn get_status(&self, run_id: &Id) -> Result<Option<MigrationStatus>>;
}

pub trait Store: ReleaseStore + ContainerStore + StatusStore + Send + Sync {}

impl<T: ReleaseStore + ContainerStore + StatusStore + Send + Sync> Store for T {}
