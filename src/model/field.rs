use crate::model::{FieldType, Id};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Field values of one container, keyed by field name.
pub type FieldMap = HashMap<String, FieldValue>;

/// A single stored field value.
///
/// Micronodes are held behind an `Arc`: cloning a parent container shares the
/// micronode by reference, and migration swaps in a fresh `Arc` only for
/// micronodes it actually upgrades. `Arc::ptr_eq` is therefore the witness
/// that an untouched micronode was never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    String(String),
    Html(String),
    Number(f64),
    Boolean(bool),
    /// Epoch milliseconds.
    Date(i64),
    /// Reference to another node by id.
    NodeRef(Id),
    Micronode(Arc<Micronode>),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// The declared scalar type this value satisfies, ignoring list nesting.
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::String(_) => FieldType::String,
            FieldValue::Html(_) => FieldType::Html,
            FieldValue::Number(_) => FieldType::Number,
            FieldValue::Boolean(_) => FieldType::Boolean,
            FieldValue::Date(_) => FieldType::Date,
            FieldValue::NodeRef(_) => FieldType::Node,
            FieldValue::Micronode(_) => FieldType::Micronode,
            FieldValue::List(items) => items
                .first()
                .map(FieldValue::field_type)
                .unwrap_or(FieldType::String),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FieldValue::List(_))
    }

    pub fn as_micronode(&self) -> Option<&Arc<Micronode>> {
        match self {
            FieldValue::Micronode(micronode) => Some(micronode),
            _ => None,
        }
    }
}

/// An embedded field container without independent identity. Its lifetime is
/// bound to the field instance that references it; it carries its own
/// microschema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Micronode {
    pub microschema_version: Id,
    pub fields: FieldMap,
}

impl Micronode {
    pub fn new(microschema_version: Id, fields: FieldMap) -> Self {
        Self {
            microschema_version,
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloning_a_field_map_shares_micronodes() {
        let micronode = Arc::new(Micronode::new("ms-v1".to_string(), FieldMap::new()));
        let mut fields = FieldMap::new();
        fields.insert(
            "vcard".to_string(),
            FieldValue::Micronode(Arc::clone(&micronode)),
        );

        let cloned = fields.clone();
        let original = fields.get("vcard").and_then(FieldValue::as_micronode).unwrap();
        let copy = cloned.get("vcard").and_then(FieldValue::as_micronode).unwrap();
        assert!(Arc::ptr_eq(original, copy));
    }

    #[test]
    fn field_value_tagged_serialization() {
        let value = FieldValue::Number(42.0);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!({"type": "number", "value": 42.0}));

        let list = FieldValue::List(vec![FieldValue::Boolean(true)]);
        let round: FieldValue =
            serde_json::from_value(serde_json::to_value(&list).unwrap()).unwrap();
        assert_eq!(round, list);
    }
}
