use crate::logic::script::{run_with_timeout, ScriptError, ScriptRegistry, TransformScript};
use crate::model::{
    FieldChange, FieldMap, FieldSchema, FieldType, FieldValue, Id, SchemaDiffError,
    SchemaVersionChain,
};
use itertools::Itertools;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Plan compilation failure. Fatal to the whole run: a bad plan must not
/// touch a single container.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Diff(#[from] SchemaDiffError),
    #[error("unknown transform script '{0}'")]
    UnknownScript(String),
}

/// One field-level transform operation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTransform {
    Add {
        name: String,
        default: Option<FieldValue>,
    },
    Remove {
        name: String,
    },
    Rename {
        from: String,
        to: String,
    },
    Retype {
        name: String,
        from: FieldSchema,
        to: FieldSchema,
    },
}

/// Transforms plus optional script for one version hop.
#[derive(Clone)]
struct PlanStep {
    to_version: Id,
    transforms: Vec<FieldTransform>,
    /// Fields this hop touches; the hop's script runs once per entry.
    touched: Vec<String>,
    script: Option<Arc<dyn TransformScript>>,
}

/// Compiled, reusable set of field transforms for one (fromVersion,
/// toVersion) pair. Computed once per run and applied to every unit.
#[derive(Clone)]
pub struct MigrationPlan {
    from_version: Id,
    to_version: Id,
    steps: Vec<PlanStep>,
    touched_fields: HashSet<String>,
}

impl MigrationPlan {
    /// An empty plan that leaves every field map unchanged (used by the
    /// release-creation migration, which moves containers without reshaping
    /// them).
    pub fn identity() -> Self {
        Self {
            from_version: Id::new(),
            to_version: Id::new(),
            steps: Vec::new(),
            touched_fields: HashSet::new(),
        }
    }

    pub fn compile(
        chain: &SchemaVersionChain,
        from: &Id,
        to: &Id,
        scripts: &ScriptRegistry,
    ) -> Result<Self, PlanError> {
        let mut steps = Vec::new();
        let mut touched_fields = HashSet::new();

        for hop in chain.diff(from, to)? {
            let mut transforms = Vec::new();
            let mut touched = Vec::new();
            for change in hop.changes {
                match change {
                    FieldChange::Added { schema } => {
                        touched.push(schema.name.clone());
                        transforms.push(FieldTransform::Add {
                            name: schema.name.clone(),
                            default: schema.default,
                        });
                    }
                    FieldChange::Removed { name } => {
                        touched.push(name.clone());
                        transforms.push(FieldTransform::Remove { name });
                    }
                    FieldChange::Renamed { from, to } => {
                        touched.push(from.clone());
                        touched.push(to.clone());
                        transforms.push(FieldTransform::Rename { from, to });
                    }
                    FieldChange::Retyped { name, from, to } => {
                        touched.push(name.clone());
                        transforms.push(FieldTransform::Retype { name, from, to });
                    }
                }
            }

            let script = match hop.script {
                Some(name) => Some(Arc::clone(
                    scripts.get(&name).ok_or(PlanError::UnknownScript(name))?,
                )),
                None => None,
            };

            let touched: Vec<String> = touched.into_iter().unique().sorted().collect();
            touched_fields.extend(touched.iter().cloned());
            steps.push(PlanStep {
                to_version: hop.to_version,
                transforms,
                touched,
                script,
            });
        }

        Ok(Self {
            from_version: from.clone(),
            to_version: to.clone(),
            steps,
            touched_fields,
        })
    }

    pub fn from_version(&self) -> &Id {
        &self.from_version
    }

    pub fn to_version(&self) -> &Id {
        &self.to_version
    }

    /// Field names affected by any hop; unrelated fields can be skipped
    /// entirely by callers.
    pub fn touched_fields(&self) -> &HashSet<String> {
        &self.touched_fields
    }

    pub fn is_identity(&self) -> bool {
        self.steps.is_empty()
    }

    /// Apply every hop to the field map in order. Structural transforms
    /// first, then the hop's script once per touched field. Script failure
    /// (including timeout) fails the unit, never the run.
    pub fn apply(
        &self,
        mut fields: FieldMap,
        script_timeout: Duration,
    ) -> Result<FieldMap, ScriptError> {
        for step in &self.steps {
            for transform in &step.transforms {
                match transform {
                    FieldTransform::Add { name, default } => {
                        if let Some(value) = default {
                            fields.insert(name.clone(), value.clone());
                        }
                    }
                    FieldTransform::Remove { name } => {
                        fields.remove(name);
                    }
                    FieldTransform::Rename { from, to } => {
                        if let Some(value) = fields.remove(from) {
                            fields.insert(to.clone(), value);
                        }
                    }
                    FieldTransform::Retype { name, from, to } => {
                        if let Some(value) = fields.remove(name) {
                            if let Some(coerced) = coerce(value, from, to) {
                                fields.insert(name.clone(), coerced);
                            }
                        }
                    }
                }
            }
            if let Some(script) = &step.script {
                for field_name in &step.touched {
                    fields = run_with_timeout(script, fields, field_name, script_timeout)?;
                }
            }
        }
        Ok(fields)
    }

    /// Version ids this plan steps through, ending at `to_version`.
    pub fn step_versions(&self) -> impl Iterator<Item = &Id> {
        self.steps.iter().map(|s| &s.to_version)
    }
}

/// Deterministic, total coercion for a retyped field. Unsupported pairs
/// yield `None` (the field becomes absent); retyping is lossy, not a hard
/// failure.
pub fn coerce(value: FieldValue, from: &FieldSchema, to: &FieldSchema) -> Option<FieldValue> {
    // References and micronodes are never structurally coerced, in either
    // direction.
    if from.field_type.is_complex() || to.field_type.is_complex() {
        return None;
    }

    match (from.list, to.list) {
        (false, false) => coerce_scalar(value, from.field_type, to.field_type),
        // Scalar into list: coerce the scalar, then wrap it as a singleton.
        (false, true) => {
            coerce_scalar(value, from.field_type, to.field_type).map(|v| FieldValue::List(vec![v]))
        }
        (true, true) => match value {
            FieldValue::List(items) => Some(FieldValue::List(
                items
                    .into_iter()
                    .filter_map(|item| coerce_scalar(item, from.field_type, to.field_type))
                    .collect(),
            )),
            _ => None,
        },
        (true, false) => None,
    }
}

fn coerce_scalar(value: FieldValue, from: FieldType, to: FieldType) -> Option<FieldValue> {
    if from == to {
        return Some(value);
    }
    match (value, to) {
        (FieldValue::Number(n), FieldType::String) => Some(FieldValue::String(number_text(n))),
        (FieldValue::Number(n), FieldType::Html) => Some(FieldValue::Html(number_text(n))),
        // Numbers turned into dates are treated as epoch values.
        (FieldValue::Number(n), FieldType::Date) => Some(FieldValue::Date(n as i64)),
        (FieldValue::Number(n), FieldType::Boolean) => Some(FieldValue::Boolean(n != 0.0)),
        (FieldValue::String(s), FieldType::Html) => Some(FieldValue::Html(s)),
        (FieldValue::Html(s), FieldType::String) => Some(FieldValue::String(s)),
        _ => None,
    }
}

/// Decimal textual form without a trailing `.0` for whole numbers.
fn number_text(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SchemaKind;
    use std::collections::HashMap;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn scalar(field_type: FieldType) -> FieldSchema {
        FieldSchema::new("f", field_type)
    }

    fn list_of(field_type: FieldType) -> FieldSchema {
        FieldSchema::list("f", field_type)
    }

    #[test]
    fn number_coercions() {
        let n = FieldValue::Number(4711.0);
        assert_eq!(
            coerce(n.clone(), &scalar(FieldType::Number), &scalar(FieldType::String)),
            Some(FieldValue::String("4711".to_string()))
        );
        assert_eq!(
            coerce(n.clone(), &scalar(FieldType::Number), &scalar(FieldType::Date)),
            Some(FieldValue::Date(4711))
        );
        assert_eq!(
            coerce(n.clone(), &scalar(FieldType::Number), &scalar(FieldType::Boolean)),
            Some(FieldValue::Boolean(true))
        );
        assert_eq!(
            coerce(
                FieldValue::Number(0.0),
                &scalar(FieldType::Number),
                &scalar(FieldType::Boolean)
            ),
            Some(FieldValue::Boolean(false))
        );
        assert_eq!(
            coerce(
                FieldValue::Number(1.5),
                &scalar(FieldType::Number),
                &scalar(FieldType::String)
            ),
            Some(FieldValue::String("1.5".to_string()))
        );
    }

    #[test]
    fn scalar_to_list_wraps_a_singleton() {
        assert_eq!(
            coerce(
                FieldValue::Number(7.0),
                &scalar(FieldType::Number),
                &list_of(FieldType::Date)
            ),
            Some(FieldValue::List(vec![FieldValue::Date(7)]))
        );
        assert_eq!(
            coerce(
                FieldValue::String("a".to_string()),
                &scalar(FieldType::String),
                &list_of(FieldType::String)
            ),
            Some(FieldValue::List(vec![FieldValue::String("a".to_string())]))
        );
    }

    #[test]
    fn complex_sources_and_targets_are_never_coerced() {
        assert_eq!(
            coerce(
                FieldValue::NodeRef("other".to_string()),
                &scalar(FieldType::Node),
                &scalar(FieldType::String)
            ),
            None
        );
        assert_eq!(
            coerce(
                FieldValue::String("x".to_string()),
                &scalar(FieldType::String),
                &scalar(FieldType::Micronode)
            ),
            None
        );
    }

    #[test]
    fn unsupported_pairs_yield_absent() {
        assert_eq!(
            coerce(
                FieldValue::Boolean(true),
                &scalar(FieldType::Boolean),
                &scalar(FieldType::Date)
            ),
            None
        );
        assert_eq!(
            coerce(
                FieldValue::List(vec![FieldValue::Number(1.0)]),
                &list_of(FieldType::Number),
                &scalar(FieldType::Number)
            ),
            None
        );
    }

    fn renaming_chain(script: Option<String>) -> SchemaVersionChain {
        let mut chain = SchemaVersionChain::new("article", SchemaKind::Schema);
        chain.push_version(
            vec![FieldSchema::new("title", FieldType::String)],
            HashMap::new(),
            None,
        );
        chain.push_version(
            vec![FieldSchema::new("headline", FieldType::String)],
            HashMap::from([("headline".to_string(), "title".to_string())]),
            script,
        );
        chain
    }

    #[test]
    fn rename_carries_the_value_across() {
        let chain = renaming_chain(None);
        let plan = MigrationPlan::compile(
            &chain,
            &chain.versions()[0].id,
            &chain.versions()[1].id,
            &ScriptRegistry::new(),
        )
        .unwrap();

        let mut fields = FieldMap::new();
        fields.insert("title".to_string(), FieldValue::String("Hello".to_string()));
        let out = plan.apply(fields, TIMEOUT).unwrap();

        assert_eq!(
            out.get("headline"),
            Some(&FieldValue::String("Hello".to_string()))
        );
        assert!(!out.contains_key("title"));
        assert!(plan.touched_fields().contains("title"));
        assert!(plan.touched_fields().contains("headline"));
    }

    #[test]
    fn added_field_gets_its_default() {
        let mut chain = SchemaVersionChain::new("article", SchemaKind::Schema);
        chain.push_version(vec![], HashMap::new(), None);
        chain.push_version(
            vec![
                FieldSchema::new("teaser", FieldType::String)
                    .with_default(FieldValue::String("tbd".to_string())),
                FieldSchema::new("slug", FieldType::String),
            ],
            HashMap::new(),
            None,
        );
        let plan = MigrationPlan::compile(
            &chain,
            &chain.versions()[0].id,
            &chain.versions()[1].id,
            &ScriptRegistry::new(),
        )
        .unwrap();

        let out = plan.apply(FieldMap::new(), TIMEOUT).unwrap();
        assert_eq!(
            out.get("teaser"),
            Some(&FieldValue::String("tbd".to_string()))
        );
        // Added field without a default stays absent.
        assert!(!out.contains_key("slug"));
    }

    #[test]
    fn script_runs_after_structural_transforms() {
        let chain = renaming_chain(Some("shout".to_string()));
        let mut scripts = ScriptRegistry::new();
        scripts.register_fn("shout", |mut fields: FieldMap, name: &str| {
            if let Some(FieldValue::String(s)) = fields.get(name) {
                let shouted = format!("{}!", s);
                fields.insert(name.to_string(), FieldValue::String(shouted));
            }
            Ok(fields)
        });
        let plan = MigrationPlan::compile(
            &chain,
            &chain.versions()[0].id,
            &chain.versions()[1].id,
            &scripts,
        )
        .unwrap();

        let mut fields = FieldMap::new();
        fields.insert("title".to_string(), FieldValue::String("Hello".to_string()));
        let out = plan.apply(fields, TIMEOUT).unwrap();
        // The script saw "headline" (post-rename), not "title".
        assert_eq!(
            out.get("headline"),
            Some(&FieldValue::String("Hello!".to_string()))
        );
    }

    #[test]
    fn unknown_script_fails_compilation() {
        let chain = renaming_chain(Some("missing".to_string()));
        let err = MigrationPlan::compile(
            &chain,
            &chain.versions()[0].id,
            &chain.versions()[1].id,
            &ScriptRegistry::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PlanError::UnknownScript(name) if name == "missing"));
    }
}
