use crate::model::{ContainerType, FieldContainer, Id};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// External search index collaborator. At-least-once semantics are fine;
/// migrations move strictly forward in version order so last-write-wins per
/// document id keeps the projection consistent.
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    async fn store_document(
        &self,
        index: &str,
        id: &str,
        release_id: &Id,
        container_type: ContainerType,
        document: serde_json::Value,
    ) -> anyhow::Result<()>;

    async fn delete_document(
        &self,
        index: &str,
        id: &str,
        release_id: &Id,
        container_type: ContainerType,
    ) -> anyhow::Result<()>;
}

pub fn content_index(release_id: &Id, container_type: ContainerType) -> String {
    format!("content-{}-{}", release_id, container_type)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum IndexOp {
    Store {
        index: String,
        id: Id,
        release_id: Id,
        container_type: ContainerType,
        document: serde_json::Value,
    },
    Delete {
        index: String,
        id: Id,
        release_id: Id,
        container_type: ContainerType,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("index operation failed for '{id}' in '{index}': {message}")]
pub struct IndexApplyError {
    pub index: String,
    pub id: Id,
    pub message: String,
}

/// Ordered set of pending index mutations produced by one migrated unit.
/// Applied strictly after the owning storage transaction committed; failures
/// are surfaced to the caller but never undo content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexBatch {
    ops: Vec<IndexOp>,
}

impl IndexBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&mut self, container: &FieldContainer, container_type: ContainerType) {
        let release_id = container.release_id.clone();
        self.store_in(container, &release_id, container_type);
    }

    /// Index a container under an explicit release scope. Release-creation
    /// migration registers containers created on an earlier release for the
    /// new one, so the scope can differ from `container.release_id`.
    pub fn store_in(
        &mut self,
        container: &FieldContainer,
        release_id: &Id,
        container_type: ContainerType,
    ) {
        self.ops.push(IndexOp::Store {
            index: content_index(release_id, container_type),
            id: document_id(container),
            release_id: release_id.clone(),
            container_type,
            document: document_for(container),
        });
    }

    pub fn delete(&mut self, container: &FieldContainer, container_type: ContainerType) {
        self.ops.push(IndexOp::Delete {
            index: content_index(&container.release_id, container_type),
            id: document_id(container),
            release_id: container.release_id.clone(),
            container_type,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[IndexOp] {
        &self.ops
    }

    pub fn merge(&mut self, other: IndexBatch) {
        self.ops.extend(other.ops);
    }

    /// Apply all operations in order, collecting failures instead of
    /// stopping. The index is a rebuildable projection, so errors here are
    /// reported but do not fail the content transaction.
    pub async fn apply(&self, provider: &dyn SearchProvider) -> Vec<IndexApplyError> {
        let mut failures = Vec::new();
        for op in &self.ops {
            let result = match op {
                IndexOp::Store {
                    index,
                    id,
                    release_id,
                    container_type,
                    document,
                } => {
                    provider
                        .store_document(index, id, release_id, *container_type, document.clone())
                        .await
                        .map_err(|e| (index, id, e))
                }
                IndexOp::Delete {
                    index,
                    id,
                    release_id,
                    container_type,
                } => provider
                    .delete_document(index, id, release_id, *container_type)
                    .await
                    .map_err(|e| (index, id, e)),
            };
            if let Err((index, id, e)) = result {
                log::error!("index apply failed for '{}' in '{}': {}", id, index, e);
                failures.push(IndexApplyError {
                    index: index.clone(),
                    id: id.clone(),
                    message: e.to_string(),
                });
            }
        }
        failures
    }
}

/// Document id within a content index. Each language of a node is its own
/// search document, so the id carries both parts.
fn document_id(container: &FieldContainer) -> String {
    format!("{}-{}", container.node_id, container.language)
}

/// Search document projection of a container.
fn document_for(container: &FieldContainer) -> serde_json::Value {
    json!({
        "node": container.node_id,
        "language": container.language,
        "schema_version": container.schema_version,
        "version": container.version.to_string(),
        "editor": container.editor,
        "edited_at": container.edited_at,
        "fields": container.fields,
    })
}

/// In-memory provider that records every applied operation, for tests and
/// local runs without a search server.
#[derive(Debug, Default)]
pub struct RecordingSearchProvider {
    applied: Mutex<Vec<IndexOp>>,
}

impl RecordingSearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> Vec<IndexOp> {
        self.applied.lock().clone()
    }
}

#[async_trait::async_trait]
impl SearchProvider for RecordingSearchProvider {
    async fn store_document(
        &self,
        index: &str,
        id: &str,
        release_id: &Id,
        container_type: ContainerType,
        document: serde_json::Value,
    ) -> anyhow::Result<()> {
        self.applied.lock().push(IndexOp::Store {
            index: index.to_string(),
            id: id.to_string(),
            release_id: release_id.clone(),
            container_type,
            document,
        });
        Ok(())
    }

    async fn delete_document(
        &self,
        index: &str,
        id: &str,
        release_id: &Id,
        container_type: ContainerType,
    ) -> anyhow::Result<()> {
        self.applied.lock().push(IndexOp::Delete {
            index: index.to_string(),
            id: id.to_string(),
            release_id: release_id.clone(),
            container_type,
        });
        Ok(())
    }
}
