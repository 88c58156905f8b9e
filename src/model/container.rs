use crate::model::{generate_id, FieldMap, Id, VersionNumber};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored document. Field values live in per-language, per-release
/// [`FieldContainer`]s; the node itself only anchors identity and the schema
/// chain its containers conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: Id,
    pub schema_name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl Node {
    pub fn new(schema_name: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            schema_name: schema_name.into(),
            created_at: Utc::now(),
            created_by: created_by.into(),
        }
    }
}

/// The versioned storage unit holding one node's field values for one
/// language and release, bound to one schema version.
///
/// Containers are never mutated in place: edits and migrations always create
/// a new container and repoint the owning node's current draft/published
/// markers (which live in the store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldContainer {
    pub id: Id,
    pub node_id: Id,
    pub language: String,
    pub release_id: Id,
    pub schema_version: Id,
    pub version: VersionNumber,
    pub editor: String,
    pub edited_at: DateTime<Utc>,
    pub fields: FieldMap,
}

impl FieldContainer {
    pub fn new(
        node_id: Id,
        language: impl Into<String>,
        release_id: Id,
        schema_version: Id,
        editor: impl Into<String>,
        fields: FieldMap,
    ) -> Self {
        Self {
            id: generate_id(),
            node_id,
            language: language.into(),
            release_id,
            schema_version,
            version: VersionNumber::initial_draft(),
            editor: editor.into(),
            edited_at: Utc::now(),
            fields,
        }
    }

    /// Value copy under a fresh identity. Fields are cloned by value, which
    /// shares contained micronodes by reference; the caller reassigns schema
    /// version and version number as the migration demands.
    pub fn clone_for_migration(&self, version: VersionNumber) -> Self {
        Self {
            id: generate_id(),
            node_id: self.node_id.clone(),
            language: self.language.clone(),
            release_id: self.release_id.clone(),
            schema_version: self.schema_version.clone(),
            version,
            editor: self.editor.clone(),
            edited_at: Utc::now(),
            fields: self.fields.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldValue, Micronode};
    use std::sync::Arc;

    #[test]
    fn migration_clone_gets_fresh_identity_and_shares_micronodes() {
        let node = Node::new("article", "author");
        let micronode = Arc::new(Micronode::new("ms-v1".to_string(), FieldMap::new()));
        let mut fields = FieldMap::new();
        fields.insert("title".to_string(), FieldValue::String("Hello".to_string()));
        fields.insert(
            "vcard".to_string(),
            FieldValue::Micronode(Arc::clone(&micronode)),
        );

        let container = FieldContainer::new(
            node.id.clone(),
            "en",
            "release-1".to_string(),
            "schema-v1".to_string(),
            "author",
            fields,
        );
        let clone = container.clone_for_migration(container.version.next_draft());

        assert_ne!(clone.id, container.id);
        assert!(clone.version > container.version);
        assert_eq!(clone.fields.get("title"), container.fields.get("title"));
        let shared = clone.fields.get("vcard").and_then(FieldValue::as_micronode).unwrap();
        assert!(Arc::ptr_eq(shared, &micronode));
    }
}
