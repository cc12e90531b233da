use std::fmt;

use crate::sql::StatementKind;
use crate::{ShardlineError, Value};

use super::generator::builtin_generators;
use super::{
    build_sql, GroupedParameterBuilder, ParameterBuilder, RewriteContext, SqlToken,
    SqlTokenGenerator, StandardParameterBuilder,
};

/// Rewritten SQL and parameters for one route unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUnit {
    pub data_source: String,
    pub sql: String,
    pub parameters: Vec<Value>,
}

pub struct RewriteEngine {
    generators: Vec<Box<dyn SqlTokenGenerator>>,
}

impl fmt::Debug for RewriteEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewriteEngine")
            .field(
                "generators",
                &self
                    .generators
                    .iter()
                    .map(|generator| generator.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for RewriteEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RewriteEngine {
    pub fn new() -> Self {
        Self {
            generators: builtin_generators(),
        }
    }

    pub fn empty() -> Self {
        Self {
            generators: Vec::new(),
        }
    }

    pub fn with_generator(mut self, generator: impl SqlTokenGenerator + 'static) -> Self {
        self.generators.push(Box::new(generator));
        self
    }

    /// One execution unit per route unit, in route order. An always-false
    /// route produces none.
    pub fn rewrite(&self, context: &RewriteContext<'_>) -> Result<Vec<ExecutionUnit>, ShardlineError> {
        let statement = context.statement;
        let route = context.route;
        if route.always_false || route.units.is_empty() {
            return Ok(Vec::new());
        }

        let insert = statement
            .insert
            .as_ref()
            .filter(|_| statement.kind == StatementKind::Insert);
        let mut parameters = match insert {
            Some(insert) => {
                ParameterBuilder::Grouped(GroupedParameterBuilder::new(insert, context.params)?)
            }
            None => ParameterBuilder::Standard(StandardParameterBuilder::new(
                context.params.to_vec(),
            )),
        };

        let mut tokens: Vec<SqlToken> = Vec::new();
        for generator in &self.generators {
            let generated = generator.generate(context)?;
            if generated.is_empty() {
                continue;
            }
            tracing::trace!(
                generator = generator.name(),
                tokens = generated.tokens.len(),
                parameter_edits = generated.parameter_edits.len(),
                "token generator contributed"
            );
            for edit in &generated.parameter_edits {
                parameters.apply(edit)?;
            }
            tokens.extend(generated.tokens);
        }
        tokens.sort_by_key(|token| (token.start(), token.stop()));

        let numbered = statement.dialect.uses_numbered_markers()
            && !statement.parameter_markers.is_empty();
        if numbered && parameters.has_additions() {
            return Err(ShardlineError::unsupported(
                "rewrites that add parameters need positional '?' markers",
            ));
        }

        let mut units = Vec::with_capacity(route.units.len());
        for unit in &route.units {
            let rows = match insert {
                Some(insert) if route.original_data_nodes.len() == insert.rows.len() => route
                    .original_data_nodes
                    .iter()
                    .enumerate()
                    .filter(|(_, node)| unit.contains_node(node))
                    .map(|(row, _)| row)
                    .collect::<Vec<_>>(),
                Some(insert) => (0..insert.rows.len()).collect(),
                None => Vec::new(),
            };
            if numbered && insert.is_some_and(|insert| rows.len() != insert.rows.len()) {
                return Err(ShardlineError::unsupported(
                    "INSERT rows split across shards need positional '?' markers",
                ));
            }
            units.push(ExecutionUnit {
                data_source: unit.data_source.clone(),
                sql: build_sql(&statement.sql, &tokens, unit)?,
                parameters: parameters.build(&rows),
            });
        }
        tracing::debug!(
            units = units.len(),
            tokens = tokens.len(),
            "rewrote statement"
        );
        Ok(units)
    }
}
