use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use cel::{Context, Program};
use serde_json::Value as JsonValue;

use crate::{ShardlineError, Value};

use super::value::{cel_to_json, value_to_cel};

#[derive(Debug)]
struct CompiledProgram {
    program: Program,
}

/// Compiles and caches CEL programs keyed by their source text.
#[derive(Default)]
pub(crate) struct CelEvaluator {
    programs: RwLock<HashMap<String, Arc<CompiledProgram>>>,
}

impl std::fmt::Debug for CelEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CelEvaluator").finish_non_exhaustive()
    }
}

impl CelEvaluator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn evaluate(
        &self,
        expression: &str,
        variables: &[(&str, &Value)],
    ) -> Result<JsonValue, ShardlineError> {
        let compiled = self.compile(expression)?;
        let mut context = Context::default();
        for (name, value) in variables {
            context.add_variable_from_value(name.to_string(), value_to_cel(value));
        }
        let value = compiled.program.execute(&context).map_err(|err| {
            ShardlineError::configuration(format!(
                "failed to evaluate CEL expression '{expression}': {err}"
            ))
        })?;
        cel_to_json(&value)
    }

    /// Parses `expression` without evaluating it.
    pub(crate) fn validate(&self, expression: &str) -> Result<(), ShardlineError> {
        self.compile(expression).map(|_| ())
    }

    fn compile(&self, expression: &str) -> Result<Arc<CompiledProgram>, ShardlineError> {
        let cached = self
            .programs
            .read()
            .ok()
            .and_then(|programs| programs.get(expression).cloned());
        if let Some(existing) = cached {
            return Ok(existing);
        }

        let program = Program::compile(expression).map_err(|err| {
            ShardlineError::configuration(format!(
                "failed to parse CEL expression '{expression}': {err}"
            ))
        })?;
        let compiled = Arc::new(CompiledProgram { program });

        if let Ok(mut programs) = self.programs.write() {
            programs.insert(expression.to_string(), compiled.clone());
        }

        Ok(compiled)
    }
}
