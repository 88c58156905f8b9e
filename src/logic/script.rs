use crate::model::FieldMap;
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// A schema-declared custom transform, authored by schema designers. Must be
/// a pure function of the field map; it gets invoked once per unit for every
/// touched field of its version hop and may arbitrarily rewrite the map.
pub trait TransformScript: Send + Sync {
    fn name(&self) -> &str;
    fn transform(&self, fields: FieldMap, field_name: &str) -> anyhow::Result<FieldMap>;
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("transform script '{script}' failed on field '{field}': {message}")]
    Failed {
        script: String,
        field: String,
        message: String,
    },
    #[error("transform script '{script}' exceeded {timeout_ms}ms on field '{field}'")]
    Timeout {
        script: String,
        field: String,
        timeout_ms: u64,
    },
    #[error("transform script '{script}' terminated abnormally on field '{field}'")]
    Terminated { script: String, field: String },
}

/// Run a script on a watchdog thread so a non-terminating or panicking script
/// becomes a per-unit error instead of hanging or killing the run. A timed
/// out thread is abandoned; the run never waits on it again.
pub fn run_with_timeout(
    script: &Arc<dyn TransformScript>,
    fields: FieldMap,
    field_name: &str,
    timeout: Duration,
) -> Result<FieldMap, ScriptError> {
    let (tx, rx) = mpsc::channel();
    let task = Arc::clone(script);
    let field = field_name.to_string();
    let spawned = std::thread::Builder::new()
        .name(format!("transform-{}", script.name()))
        .spawn(move || {
            let _ = tx.send(task.transform(fields, &field));
        });
    if let Err(e) = spawned {
        return Err(ScriptError::Failed {
            script: script.name().to_string(),
            field: field_name.to_string(),
            message: format!("failed to spawn script thread: {e}"),
        });
    }

    match rx.recv_timeout(timeout) {
        Ok(Ok(fields)) => Ok(fields),
        Ok(Err(e)) => Err(ScriptError::Failed {
            script: script.name().to_string(),
            field: field_name.to_string(),
            message: e.to_string(),
        }),
        Err(RecvTimeoutError::Timeout) => Err(ScriptError::Timeout {
            script: script.name().to_string(),
            field: field_name.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
        // Sender dropped without a result: the script panicked.
        Err(RecvTimeoutError::Disconnected) => Err(ScriptError::Terminated {
            script: script.name().to_string(),
            field: field_name.to_string(),
        }),
    }
}

/// Script lookup table, built at startup alongside the schema registry.
#[derive(Default, Clone)]
pub struct ScriptRegistry {
    scripts: HashMap<String, Arc<dyn TransformScript>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, script: Arc<dyn TransformScript>) {
        self.scripts.insert(script.name().to_string(), script);
    }

    /// Register a plain closure as a script.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(FieldMap, &str) -> anyhow::Result<FieldMap> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnScript {
            name: name.into(),
            func,
        }));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn TransformScript>> {
        self.scripts.get(name)
    }
}

struct FnScript<F> {
    name: String,
    func: F,
}

impl<F> TransformScript for FnScript<F>
where
    F: Fn(FieldMap, &str) -> anyhow::Result<FieldMap> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, fields: FieldMap, field_name: &str) -> anyhow::Result<FieldMap> {
        (self.func)(fields, field_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValue;
    use anyhow::anyhow;

    fn uppercase_registry() -> ScriptRegistry {
        let mut registry = ScriptRegistry::new();
        registry.register_fn("uppercase", |mut fields: FieldMap, name: &str| {
            if let Some(FieldValue::String(s)) = fields.get(name) {
                let upper = s.to_uppercase();
                fields.insert(name.to_string(), FieldValue::String(upper));
            }
            Ok(fields)
        });
        registry
    }

    #[test]
    fn script_rewrites_the_field_map() {
        let registry = uppercase_registry();
        let script = registry.get("uppercase").unwrap();
        let mut fields = FieldMap::new();
        fields.insert("title".to_string(), FieldValue::String("hello".to_string()));

        let out = run_with_timeout(script, fields, "title", Duration::from_secs(1)).unwrap();
        assert_eq!(
            out.get("title"),
            Some(&FieldValue::String("HELLO".to_string()))
        );
    }

    #[test]
    fn hanging_script_times_out() {
        let mut registry = ScriptRegistry::new();
        registry.register_fn("spin", |fields: FieldMap, _: &str| {
            std::thread::sleep(Duration::from_secs(60));
            Ok(fields)
        });
        let script = registry.get("spin").unwrap();

        let err = run_with_timeout(script, FieldMap::new(), "x", Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, ScriptError::Timeout { .. }));
    }

    #[test]
    fn panicking_script_is_reported_as_terminated() {
        let mut registry = ScriptRegistry::new();
        registry.register_fn("boom", |_: FieldMap, _: &str| -> anyhow::Result<FieldMap> {
            panic!("script went rogue")
        });
        let script = registry.get("boom").unwrap();

        let err = run_with_timeout(script, FieldMap::new(), "x", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, ScriptError::Terminated { .. }));
    }

    #[test]
    fn failing_script_carries_its_message() {
        let mut registry = ScriptRegistry::new();
        registry.register_fn("deny", |_: FieldMap, _: &str| -> anyhow::Result<FieldMap> {
            Err(anyhow!("not on my watch"))
        });
        let script = registry.get("deny").unwrap();

        let err = run_with_timeout(script, FieldMap::new(), "x", Duration::from_secs(1))
            .unwrap_err();
        assert!(err.to_string().contains("not on my watch"));
    }
}
