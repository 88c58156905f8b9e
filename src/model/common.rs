use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Scalar shape of a field as declared by a schema version. List-ness is a
/// separate flag on the field schema, not a wrapper type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Html,
    Number,
    Boolean,
    Date,
    Node,
    Micronode,
}

impl FieldType {
    /// Node references and micronodes are never coerced into unrelated types.
    pub fn is_complex(&self) -> bool {
        matches!(self, FieldType::Node | FieldType::Micronode)
    }
}

/// Which lifecycle slot of a (node, language, release) a container occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContainerType {
    Draft,
    Published,
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerType::Draft => write!(f, "draft"),
            ContainerType::Published => write!(f, "published"),
        }
    }
}

/// Content version number in `major.minor` form.
///
/// A fresh draft starts at 0.1. Edits bump the minor part, publishing bumps
/// the major part and zeroes the minor, so a published container always
/// compares less-or-equal to the draft that succeeded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionNumber {
    pub major: u32,
    pub minor: u32,
}

impl VersionNumber {
    pub fn initial_draft() -> Self {
        Self { major: 0, minor: 1 }
    }

    /// Next draft version (minor bump).
    pub fn next_draft(&self) -> Self {
        Self {
            major: self.major,
            minor: self.minor + 1,
        }
    }

    /// Next published version (major bump, minor reset).
    pub fn next_published(&self) -> Self {
        Self {
            major: self.major + 1,
            minor: 0,
        }
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_number_ordering() {
        let draft = VersionNumber::initial_draft();
        let next = draft.next_draft();
        let published = next.next_published();

        assert!(draft < next);
        assert!(next < published);
        assert_eq!(published, VersionNumber { major: 1, minor: 0 });
        assert_eq!(published.next_draft().to_string(), "1.1");
    }

    #[test]
    fn container_type_serializes_uppercase() {
        let json = serde_json::to_string(&ContainerType::Published).unwrap();
        assert_eq!(json, "\"PUBLISHED\"");
    }
}
