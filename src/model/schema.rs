use crate::model::{generate_id, FieldType, FieldValue, Id};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    Schema,
    Microschema,
}

/// One field declaration inside a schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub list: bool,
    /// Value given to the field when a migration adds it. Absent means the
    /// added field simply has no value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldValue>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            list: false,
            default: None,
        }
    }

    pub fn list(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            list: true,
            default: None,
        }
    }

    pub fn with_default(mut self, default: FieldValue) -> Self {
        self.default = Some(default);
        self
    }

    fn same_shape(&self, other: &FieldSchema) -> bool {
        self.field_type == other.field_type && self.list == other.list
    }
}

/// Immutable-once-published version of a named schema or microschema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub id: Id,
    pub schema_name: String,
    pub kind: SchemaKind,
    /// Position in the owning chain, starting at 1.
    pub ordinal: u32,
    pub fields: Vec<FieldSchema>,
    /// Maps a field name in this version to its name in the previous version.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub rename_map: HashMap<String, String>,
    /// Name of a registered transform script to run after the structural
    /// transforms of the hop onto this version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform_script: Option<String>,
}

impl SchemaVersion {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A single field-level change between two adjacent schema versions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    Added { schema: FieldSchema },
    Removed { name: String },
    Renamed { from: String, to: String },
    Retyped { name: String, from: FieldSchema, to: FieldSchema },
}

/// The changes of one version hop, in application order, plus the hop's
/// optional transform script name.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionStep {
    pub to_version: Id,
    pub changes: Vec<FieldChange>,
    pub script: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaDiffError {
    #[error("version '{0}' does not belong to this chain")]
    UnknownVersion(Id),
    #[error("target version {to} is not after source version {from}")]
    NotForward { from: u32, to: u32 },
    #[error("rename source '{old_name}' missing from version {ordinal} of '{schema}'")]
    RenameSourceMissing {
        schema: String,
        ordinal: u32,
        old_name: String,
    },
    #[error("duplicate field '{field}' in version {ordinal} of '{schema}'")]
    DuplicateField {
        schema: String,
        ordinal: u32,
        field: String,
    },
}

/// Append-only, ordered sequence of versions for one named schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVersionChain {
    pub name: String,
    pub kind: SchemaKind,
    versions: Vec<SchemaVersion>,
}

impl SchemaVersionChain {
    pub fn new(name: impl Into<String>, kind: SchemaKind) -> Self {
        Self {
            name: name.into(),
            kind,
            versions: Vec::new(),
        }
    }

    /// Append the next version of this schema and return it.
    pub fn push_version(
        &mut self,
        fields: Vec<FieldSchema>,
        rename_map: HashMap<String, String>,
        transform_script: Option<String>,
    ) -> &SchemaVersion {
        let version = SchemaVersion {
            id: generate_id(),
            schema_name: self.name.clone(),
            kind: self.kind,
            ordinal: self.versions.len() as u32 + 1,
            fields,
            rename_map,
            transform_script,
        };
        self.versions.push(version);
        self.versions.last().unwrap_or_else(|| unreachable!())
    }

    pub fn versions(&self) -> &[SchemaVersion] {
        &self.versions
    }

    pub fn version(&self, id: &Id) -> Option<&SchemaVersion> {
        self.versions.iter().find(|v| &v.id == id)
    }

    pub fn latest(&self) -> Option<&SchemaVersion> {
        self.versions.last()
    }

    /// Compute the ordered per-hop changes to get from `from` to `to`.
    ///
    /// Each adjacent pair in the range contributes one [`VersionStep`] so that
    /// a migration spanning several versions replays every intermediate
    /// change (and script) in order.
    pub fn diff(&self, from: &Id, to: &Id) -> Result<Vec<VersionStep>, SchemaDiffError> {
        let from_version = self
            .version(from)
            .ok_or_else(|| SchemaDiffError::UnknownVersion(from.clone()))?;
        let to_version = self
            .version(to)
            .ok_or_else(|| SchemaDiffError::UnknownVersion(to.clone()))?;
        if to_version.ordinal <= from_version.ordinal {
            return Err(SchemaDiffError::NotForward {
                from: from_version.ordinal,
                to: to_version.ordinal,
            });
        }

        let range =
            &self.versions[(from_version.ordinal as usize - 1)..(to_version.ordinal as usize)];
        range
            .iter()
            .tuple_windows()
            .map(|(old, new)| Self::hop(old, new))
            .collect()
    }

    fn hop(old: &SchemaVersion, new: &SchemaVersion) -> Result<VersionStep, SchemaDiffError> {
        let mut seen = HashSet::new();
        for field in &new.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaDiffError::DuplicateField {
                    schema: new.schema_name.clone(),
                    ordinal: new.ordinal,
                    field: field.name.clone(),
                });
            }
        }

        let mut changes = Vec::new();
        let rename_sources: HashSet<&str> =
            new.rename_map.values().map(String::as_str).collect();

        // Renames come first so a subsequent retype sees the new name.
        for (to_name, from_name) in new.rename_map.iter().sorted() {
            if old.field(from_name).is_none() {
                return Err(SchemaDiffError::RenameSourceMissing {
                    schema: new.schema_name.clone(),
                    ordinal: new.ordinal,
                    old_name: from_name.clone(),
                });
            }
            changes.push(FieldChange::Renamed {
                from: from_name.clone(),
                to: to_name.clone(),
            });
        }

        for field in &new.fields {
            let predecessor = match new.rename_map.get(&field.name) {
                Some(old_name) => old.field(old_name),
                None => old.field(&field.name),
            };
            match predecessor {
                Some(old_field) if !old_field.same_shape(field) => {
                    changes.push(FieldChange::Retyped {
                        name: field.name.clone(),
                        from: old_field.clone(),
                        to: field.clone(),
                    });
                }
                Some(_) => {}
                None if new.rename_map.contains_key(&field.name) => {}
                None => changes.push(FieldChange::Added {
                    schema: field.clone(),
                }),
            }
        }

        for field in &old.fields {
            let survives = new.field(&field.name).is_some()
                || rename_sources.contains(field.name.as_str());
            if !survives {
                changes.push(FieldChange::Removed {
                    name: field.name.clone(),
                });
            }
        }

        Ok(VersionStep {
            to_version: new.id.clone(),
            changes,
            script: new.transform_script.clone(),
        })
    }
}

/// Read-mostly registry of schema chains, built at startup and passed
/// explicitly to anything that needs version lookups.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    chains: HashMap<(SchemaKind, String), SchemaVersionChain>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, chain: SchemaVersionChain) {
        self.chains.insert((chain.kind, chain.name.clone()), chain);
    }

    pub fn chain(&self, kind: SchemaKind, name: &str) -> Option<&SchemaVersionChain> {
        self.chains.get(&(kind, name.to_string()))
    }

    /// Find the chain and version owning the given version id.
    pub fn find_version(&self, version_id: &Id) -> Option<(&SchemaVersionChain, &SchemaVersion)> {
        self.chains
            .values()
            .find_map(|chain| chain.version(version_id).map(|v| (chain, v)))
    }

    pub fn chains(&self) -> impl Iterator<Item = &SchemaVersionChain> {
        self.chains.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_version_chain() -> SchemaVersionChain {
        let mut chain = SchemaVersionChain::new("article", SchemaKind::Schema);
        chain.push_version(
            vec![
                FieldSchema::new("title", FieldType::String),
                FieldSchema::new("views", FieldType::Number),
            ],
            HashMap::new(),
            None,
        );
        chain.push_version(
            vec![
                FieldSchema::new("headline", FieldType::String),
                FieldSchema::new("views", FieldType::String),
                FieldSchema::new("teaser", FieldType::String)
                    .with_default(FieldValue::String("tbd".to_string())),
            ],
            HashMap::from([("headline".to_string(), "title".to_string())]),
            None,
        );
        chain
    }

    #[test]
    fn diff_classifies_rename_retype_add() {
        let chain = two_version_chain();
        let from = chain.versions()[0].id.clone();
        let to = chain.versions()[1].id.clone();

        let steps = chain.diff(&from, &to).unwrap();
        assert_eq!(steps.len(), 1);
        let changes = &steps[0].changes;
        assert!(changes.contains(&FieldChange::Renamed {
            from: "title".to_string(),
            to: "headline".to_string(),
        }));
        assert!(changes.iter().any(|c| matches!(
            c,
            FieldChange::Retyped { name, .. } if name == "views"
        )));
        assert!(changes.iter().any(|c| matches!(
            c,
            FieldChange::Added { schema } if schema.name == "teaser"
        )));
        // The renamed source is not additionally reported as removed.
        assert!(!changes.iter().any(|c| matches!(
            c,
            FieldChange::Removed { name } if name == "title"
        )));
    }

    #[test]
    fn diff_rejects_backward_ranges() {
        let chain = two_version_chain();
        let from = chain.versions()[1].id.clone();
        let to = chain.versions()[0].id.clone();
        assert!(matches!(
            chain.diff(&from, &to),
            Err(SchemaDiffError::NotForward { .. })
        ));
    }

    #[test]
    fn diff_spans_multiple_versions_in_order() {
        let mut chain = two_version_chain();
        chain.push_version(
            vec![
                FieldSchema::new("headline", FieldType::String),
                FieldSchema::new("views", FieldType::String),
            ],
            HashMap::new(),
            None,
        );
        let from = chain.versions()[0].id.clone();
        let to = chain.versions()[2].id.clone();

        let steps = chain.diff(&from, &to).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].to_version, chain.versions()[2].id);
        assert!(steps[1].changes.contains(&FieldChange::Removed {
            name: "teaser".to_string(),
        }));
    }

    #[test]
    fn diff_reports_missing_rename_source() {
        let mut chain = SchemaVersionChain::new("broken", SchemaKind::Schema);
        chain.push_version(
            vec![FieldSchema::new("a", FieldType::String)],
            HashMap::new(),
            None,
        );
        chain.push_version(
            vec![FieldSchema::new("b", FieldType::String)],
            HashMap::from([("b".to_string(), "nope".to_string())]),
            None,
        );
        let from = chain.versions()[0].id.clone();
        let to = chain.versions()[1].id.clone();
        let err = chain.diff(&from, &to).unwrap_err();
        assert!(matches!(
            &err,
            SchemaDiffError::RenameSourceMissing { old_name, .. } if old_name == "nope"
        ));
        assert!(err.to_string().contains("rename source 'nope'"));
    }
}
