//! SQL rewriting: token generators describe edits over the original text,
//! the SQL builder renders them per route unit and the parameter builder
//! keeps bound parameters in step.

mod builder;
mod engine;
pub mod generator;
mod parameter;
mod transform;

use crate::keygen::GeneratedKeyContext;
use crate::route::{RouteContext, RouteUnit};
use crate::rule::DataNode;
use crate::sql::{SelectContext, StatementContext, TextSpan};
use crate::{ShardlineError, Value};

pub use builder::build_sql;
pub use engine::{ExecutionUnit, RewriteEngine};
pub use parameter::{
    GroupedParameterBuilder, ParameterBuilder, ParameterEdit, StandardParameterBuilder,
};
pub use transform::{AssistedQueryColumn, ColumnTransformRule, ValueTransformer};

/// Everything a generator may inspect. Stage outputs are borrowed, never
/// modified.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    pub statement: &'a StatementContext,
    pub params: &'a [Value],
    pub route: &'a RouteContext,
    pub select: Option<&'a SelectContext>,
    pub generated_key: Option<&'a GeneratedKeyContext>,
    pub transforms: &'a [ColumnTransformRule],
}

/// An edit over the original SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlToken {
    /// Replaces `[span.start, span.stop)`.
    Substitutable { span: TextSpan, content: TokenContent },
    /// Inserts text at `index` without consuming any.
    Insertable { index: usize, content: TokenContent },
}

impl SqlToken {
    pub fn substitute(span: TextSpan, content: TokenContent) -> Self {
        Self::Substitutable { span, content }
    }

    pub fn insert(index: usize, content: TokenContent) -> Self {
        Self::Insertable { index, content }
    }

    pub fn start(&self) -> usize {
        match self {
            Self::Substitutable { span, .. } => span.start,
            Self::Insertable { index, .. } => *index,
        }
    }

    pub fn stop(&self) -> usize {
        match self {
            Self::Substitutable { span, .. } => span.stop,
            Self::Insertable { index, .. } => *index,
        }
    }

    pub fn content(&self) -> &TokenContent {
        match self {
            Self::Substitutable { content, .. } | Self::Insertable { content, .. } => content,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenContent {
    /// Same text for every unit.
    Text(String),
    /// The unit's actual table for a logic table, quoted like the original.
    Table {
        logic_table: String,
        quote_style: Option<char>,
    },
    /// VALUES rows; each unit renders only the rows routed to it.
    InsertValues(Vec<InsertValuesRow>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertValuesRow {
    pub text: String,
    /// `None` when the row goes to every unit.
    pub data_node: Option<DataNode>,
}

impl TokenContent {
    pub fn render(&self, unit: &RouteUnit) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Table {
                logic_table,
                quote_style,
            } => {
                let table = unit.actual_table(logic_table).unwrap_or(logic_table.as_str());
                match quote_style {
                    Some(open) => format!("{open}{table}{}", closing_quote(*open)),
                    None => table.to_string(),
                }
            }
            Self::InsertValues(rows) => rows
                .iter()
                .filter(|row| {
                    row.data_node
                        .as_ref()
                        .map_or(true, |node| unit.contains_node(node))
                })
                .map(|row| row.text.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

fn closing_quote(open: char) -> char {
    match open {
        '[' => ']',
        other => other,
    }
}

/// Tokens plus the parameter edits that go with them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedTokens {
    pub tokens: Vec<SqlToken>,
    pub parameter_edits: Vec<ParameterEdit>,
}

impl GeneratedTokens {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.parameter_edits.is_empty()
    }
}

/// Decides from the statement shape whether it has anything to
/// contribute; most generators return nothing for most statements.
pub trait SqlTokenGenerator: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn generate(&self, context: &RewriteContext<'_>) -> Result<GeneratedTokens, ShardlineError>;
}
