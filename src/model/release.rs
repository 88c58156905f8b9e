use crate::model::{generate_id, Id, SchemaKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named content branch. Each release pins exactly one version per
/// schema/microschema name; the previous/next pointers form the branch
/// history as plain nullable foreign keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub id: Id,
    pub name: String,
    /// Whether new content may be created on this release.
    pub active: bool,
    /// Whether live content matches the currently assigned versions. Flips
    /// false the moment any assignment changes and is only set true again by
    /// the caller after an error-free migration run.
    pub migrated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_release: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_release: Option<Id>,
    /// schema name -> assigned schema version id
    #[serde(default)]
    pub schema_versions: HashMap<String, Id>,
    /// microschema name -> assigned microschema version id
    #[serde(default)]
    pub microschema_versions: HashMap<String, Id>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl Release {
    pub fn new(name: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            active: true,
            migrated: false,
            previous_release: None,
            next_release: None,
            schema_versions: HashMap::new(),
            microschema_versions: HashMap::new(),
            created_at: Utc::now(),
            created_by: created_by.into(),
        }
    }

    fn assignments(&self, kind: SchemaKind) -> &HashMap<String, Id> {
        match kind {
            SchemaKind::Schema => &self.schema_versions,
            SchemaKind::Microschema => &self.microschema_versions,
        }
    }

    fn assignments_mut(&mut self, kind: SchemaKind) -> &mut HashMap<String, Id> {
        match kind {
            SchemaKind::Schema => &mut self.schema_versions,
            SchemaKind::Microschema => &mut self.microschema_versions,
        }
    }

    /// Assign a version to this release, unassigning any prior version of the
    /// same schema. Returns the replaced version id, if any. The map keyed by
    /// schema name makes the at-most-one-version invariant structural.
    pub fn assign_version(
        &mut self,
        kind: SchemaKind,
        schema_name: &str,
        version_id: Id,
    ) -> Option<Id> {
        let previous = self
            .assignments_mut(kind)
            .insert(schema_name.to_string(), version_id);
        self.migrated = false;
        previous
    }

    pub fn assigned_version(&self, kind: SchemaKind, schema_name: &str) -> Option<&Id> {
        self.assignments(kind).get(schema_name)
    }

    pub fn uses_version(&self, kind: SchemaKind, version_id: &Id) -> bool {
        self.assignments(kind).values().any(|v| v == version_id)
    }
}
