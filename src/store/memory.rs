use crate::model::{
    ContainerType, FieldContainer, FieldMap, FieldValue, Id, MigrationStatus, Node, Release,
    SchemaKind,
};
use crate::store::traits::{ContainerStore, ReleaseStore, StatusStore, UnitCommit};
use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

type PointerKey = (Id, String, Id, ContainerType);

#[derive(Debug, Default)]
struct Inner {
    releases: HashMap<Id, Release>,
    nodes: HashMap<Id, Node>,
    containers: HashMap<Id, FieldContainer>,
    /// (node, language, release, type) -> current container id
    current: HashMap<PointerKey, Id>,
    statuses: HashMap<Id, MigrationStatus>,
}

/// Reference store backed by process memory. All writes of one
/// [`UnitCommit`] happen under a single write lock, which makes the unit
/// boundary atomic the same way a storage transaction would.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node together with its initial draft container.
    pub fn seed_draft(
        &self,
        node: &Node,
        language: &str,
        release_id: &Id,
        schema_version: &Id,
        fields: FieldMap,
    ) -> FieldContainer {
        let container = FieldContainer::new(
            node.id.clone(),
            language,
            release_id.clone(),
            schema_version.clone(),
            node.created_by.clone(),
            fields,
        );
        let mut inner = self.inner.write();
        inner.nodes.entry(node.id.clone()).or_insert_with(|| node.clone());
        inner.current.insert(
            (
                node.id.clone(),
                language.to_string(),
                release_id.clone(),
                ContainerType::Draft,
            ),
            container.id.clone(),
        );
        inner
            .containers
            .insert(container.id.clone(), container.clone());
        container
    }

    /// Publish the current draft: a fresh container at the next published
    /// version becomes both the draft and the published current.
    pub fn publish_current(
        &self,
        node_id: &Id,
        language: &str,
        release_id: &Id,
    ) -> Result<FieldContainer> {
        let mut inner = self.inner.write();
        let draft_key = (
            node_id.clone(),
            language.to_string(),
            release_id.clone(),
            ContainerType::Draft,
        );
        let draft_id = inner
            .current
            .get(&draft_key)
            .cloned()
            .ok_or_else(|| anyhow!("no current draft for node '{}'", node_id))?;
        let draft = inner
            .containers
            .get(&draft_id)
            .cloned()
            .ok_or_else(|| anyhow!("dangling draft pointer for node '{}'", node_id))?;

        let published = draft.clone_for_migration(draft.version.next_published());
        inner.current.insert(draft_key, published.id.clone());
        inner.current.insert(
            (
                node_id.clone(),
                language.to_string(),
                release_id.clone(),
                ContainerType::Published,
            ),
            published.id.clone(),
        );
        inner
            .containers
            .insert(published.id.clone(), published.clone());
        Ok(published)
    }

    /// Replace the current draft's fields with a new draft container.
    pub fn edit_draft(
        &self,
        node_id: &Id,
        language: &str,
        release_id: &Id,
        fields: FieldMap,
    ) -> Result<FieldContainer> {
        let mut inner = self.inner.write();
        let draft_key = (
            node_id.clone(),
            language.to_string(),
            release_id.clone(),
            ContainerType::Draft,
        );
        let draft_id = inner
            .current
            .get(&draft_key)
            .cloned()
            .ok_or_else(|| anyhow!("no current draft for node '{}'", node_id))?;
        let draft = inner
            .containers
            .get(&draft_id)
            .cloned()
            .ok_or_else(|| anyhow!("dangling draft pointer for node '{}'", node_id))?;

        let mut edited = draft.clone_for_migration(draft.version.next_draft());
        edited.fields = fields;
        inner.current.insert(draft_key, edited.id.clone());
        inner.containers.insert(edited.id.clone(), edited.clone());
        Ok(edited)
    }

    fn current_drafts_of(inner: &Inner, release_id: &Id) -> Vec<(PointerKey, FieldContainer)> {
        inner
            .current
            .iter()
            .filter(|((_, _, rid, ctype), _)| rid == release_id && *ctype == ContainerType::Draft)
            .filter_map(|(key, cid)| {
                inner
                    .containers
                    .get(cid)
                    .map(|c| (key.clone(), c.clone()))
            })
            .collect()
    }
}

fn references_microschema(fields: &FieldMap, microschema_version: &Id) -> bool {
    fields.values().any(|value| match value {
        FieldValue::Micronode(m) => &m.microschema_version == microschema_version,
        FieldValue::List(items) => items.iter().any(|item| match item {
            FieldValue::Micronode(m) => &m.microschema_version == microschema_version,
            _ => false,
        }),
        _ => false,
    })
}

#[async_trait::async_trait]
impl ReleaseStore for InMemoryStore {
    async fn get_release(&self, id: &Id) -> Result<Option<Release>> {
        Ok(self.inner.read().releases.get(id).cloned())
    }

    async fn list_releases(&self) -> Result<Vec<Release>> {
        Ok(self.inner.read().releases.values().cloned().collect())
    }

    async fn upsert_release(&self, release: Release) -> Result<()> {
        self.inner
            .write()
            .releases
            .insert(release.id.clone(), release);
        Ok(())
    }

    async fn assign_schema_version(
        &self,
        release_id: &Id,
        kind: SchemaKind,
        schema_name: &str,
        version_id: &Id,
    ) -> Result<Release> {
        let mut inner = self.inner.write();
        let release = inner
            .releases
            .get_mut(release_id)
            .ok_or_else(|| anyhow!("release '{}' not found", release_id))?;
        release.assign_version(kind, schema_name, version_id.clone());
        Ok(release.clone())
    }
}

#[async_trait::async_trait]
impl ContainerStore for InMemoryStore {
    async fn get_node(&self, id: &Id) -> Result<Option<Node>> {
        Ok(self.inner.read().nodes.get(id).cloned())
    }

    async fn upsert_node(&self, node: Node) -> Result<()> {
        self.inner.write().nodes.insert(node.id.clone(), node);
        Ok(())
    }

    async fn get_container(&self, id: &Id) -> Result<Option<FieldContainer>> {
        Ok(self.inner.read().containers.get(id).cloned())
    }

    async fn current_container(
        &self,
        node_id: &Id,
        language: &str,
        release_id: &Id,
        container_type: ContainerType,
    ) -> Result<Option<FieldContainer>> {
        let inner = self.inner.read();
        let key = (
            node_id.clone(),
            language.to_string(),
            release_id.clone(),
            container_type,
        );
        Ok(inner
            .current
            .get(&key)
            .and_then(|cid| inner.containers.get(cid))
            .cloned())
    }

    async fn list_containers_for_version(
        &self,
        release_id: &Id,
        schema_version: &Id,
    ) -> Result<Vec<Id>> {
        let inner = self.inner.read();
        let mut ids: Vec<Id> = Self::current_drafts_of(&inner, release_id)
            .into_iter()
            .filter(|(_, c)| &c.schema_version == schema_version)
            .map(|(_, c)| c.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_micronode_containers(
        &self,
        release_id: &Id,
        microschema_version: &Id,
    ) -> Result<Vec<Id>> {
        let inner = self.inner.read();
        let mut ids: Vec<Id> = Self::current_drafts_of(&inner, release_id)
            .into_iter()
            .filter(|(_, c)| references_microschema(&c.fields, microschema_version))
            .map(|(_, c)| c.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_current_drafts(&self, release_id: &Id) -> Result<Vec<Id>> {
        let inner = self.inner.read();
        let mut ids: Vec<Id> = Self::current_drafts_of(&inner, release_id)
            .into_iter()
            .map(|(_, c)| c.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn commit_unit(&self, commit: UnitCommit) -> Result<()> {
        // Single write lock for the whole write set: the unit is atomic.
        let mut inner = self.inner.write();
        for container in commit.new_containers {
            inner.containers.insert(container.id.clone(), container);
        }
        for update in commit.pointer_updates {
            inner.current.insert(
                (
                    update.node_id,
                    update.language,
                    update.release_id,
                    update.container_type,
                ),
                update.container_id,
            );
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StatusStore for InMemoryStore {
    async fn persist_status(&self, run_id: &Id, status: &MigrationStatus) -> Result<()> {
        self.inner
            .write()
            .statuses
            .insert(run_id.clone(), status.clone());
        Ok(())
    }

    async fn get_status(&self, run_id: &Id) -> Result<Option<MigrationStatus>> {
        Ok(self.inner.read().statuses.get(run_id).cloned())
    }
}
