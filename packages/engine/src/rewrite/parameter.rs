use std::collections::BTreeMap;

use crate::sql::InsertSegment;
use crate::{ShardlineError, Value};

/// One change to the bound parameter list, addressed by original index.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterEdit {
    Replace { index: usize, value: Value },
    /// Inserts before the parameter currently at `index`; an index at or
    /// past the end appends.
    Add { index: usize, value: Value },
    /// Appends to the parameters of one INSERT row.
    AppendToRow { row: usize, value: Value },
}

/// Flat parameter list with pending additions and replacements.
/// Replacements apply first, then additions from the highest index down.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StandardParameterBuilder {
    original: Vec<Value>,
    added: BTreeMap<usize, Vec<Value>>,
    replaced: BTreeMap<usize, Value>,
}

impl StandardParameterBuilder {
    pub fn new(original: Vec<Value>) -> Self {
        Self {
            original,
            added: BTreeMap::new(),
            replaced: BTreeMap::new(),
        }
    }

    pub fn replace(&mut self, index: usize, value: Value) -> Result<(), ShardlineError> {
        if index >= self.original.len() {
            return Err(ShardlineError::RewriteInvariantViolation(format!(
                "replacement targets parameter {} of {}",
                index + 1,
                self.original.len()
            )));
        }
        self.replaced.insert(index, value);
        Ok(())
    }

    pub fn add(&mut self, index: usize, value: Value) {
        self.added.entry(index).or_default().push(value);
    }

    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    pub fn has_additions(&self) -> bool {
        !self.added.is_empty()
    }

    pub fn build(&self) -> Vec<Value> {
        let mut parameters = self.original.clone();
        for (index, value) in &self.replaced {
            parameters[*index] = value.clone();
        }
        let len = parameters.len();
        let appended = self
            .added
            .range(len..)
            .flat_map(|(_, values)| values.iter().cloned())
            .collect::<Vec<_>>();
        for (index, values) in self.added.range(..len).rev() {
            parameters.splice(*index..*index, values.iter().cloned());
        }
        parameters.extend(appended);
        parameters
    }
}

/// One builder per INSERT row, so each unit receives exactly the
/// parameters of the rows routed to it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedParameterBuilder {
    groups: Vec<StandardParameterBuilder>,
    /// Original parameter index to (row, position within the row).
    positions: BTreeMap<usize, (usize, usize)>,
}

impl GroupedParameterBuilder {
    pub fn new(insert: &InsertSegment, params: &[Value]) -> Result<Self, ShardlineError> {
        let mut groups = Vec::with_capacity(insert.rows.len());
        let mut positions = BTreeMap::new();
        for (row, insert_row) in insert.rows.iter().enumerate() {
            let mut values = Vec::with_capacity(insert_row.parameter_indices.len());
            for (position, index) in insert_row.parameter_indices.iter().enumerate() {
                values.push(params.get(*index).cloned().ok_or_else(|| {
                    ShardlineError::malformed(format!(
                        "parameter {} is not bound ({} parameters supplied)",
                        index + 1,
                        params.len()
                    ))
                })?);
                positions.insert(*index, (row, position));
            }
            groups.push(StandardParameterBuilder::new(values));
        }
        Ok(Self { groups, positions })
    }

    pub fn row_count(&self) -> usize {
        self.groups.len()
    }

    pub fn group(&self, row: usize) -> Option<&StandardParameterBuilder> {
        self.groups.get(row)
    }

    pub fn has_additions(&self) -> bool {
        self.groups.iter().any(StandardParameterBuilder::has_additions)
    }

    fn locate(&self, index: usize) -> Result<(usize, usize), ShardlineError> {
        self.positions.get(&index).copied().ok_or_else(|| {
            ShardlineError::RewriteInvariantViolation(format!(
                "parameter {} belongs to no VALUES row",
                index + 1
            ))
        })
    }

    fn group_mut(&mut self, row: usize) -> Result<&mut StandardParameterBuilder, ShardlineError> {
        let rows = self.groups.len();
        self.groups.get_mut(row).ok_or_else(|| {
            ShardlineError::RewriteInvariantViolation(format!(
                "parameter edit targets row {} of {rows}",
                row + 1
            ))
        })
    }

    /// Parameters of the selected rows, in row order.
    pub fn build(&self, rows: &[usize]) -> Vec<Value> {
        rows.iter()
            .filter_map(|row| self.groups.get(*row))
            .flat_map(StandardParameterBuilder::build)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterBuilder {
    Standard(StandardParameterBuilder),
    Grouped(GroupedParameterBuilder),
}

impl ParameterBuilder {
    pub fn apply(&mut self, edit: &ParameterEdit) -> Result<(), ShardlineError> {
        match (self, edit) {
            (Self::Standard(builder), ParameterEdit::Replace { index, value }) => {
                builder.replace(*index, value.clone())
            }
            (Self::Standard(builder), ParameterEdit::Add { index, value }) => {
                builder.add(*index, value.clone());
                Ok(())
            }
            (Self::Standard(_), ParameterEdit::AppendToRow { .. }) => {
                Err(ShardlineError::RewriteInvariantViolation(
                    "row parameter edit on a statement without VALUES rows".to_string(),
                ))
            }
            (Self::Grouped(builder), ParameterEdit::Replace { index, value }) => {
                let (row, position) = builder.locate(*index)?;
                builder.group_mut(row)?.replace(position, value.clone())
            }
            (Self::Grouped(builder), ParameterEdit::Add { index, value }) => {
                let (row, position) = builder.locate(*index)?;
                builder.group_mut(row)?.add(position, value.clone());
                Ok(())
            }
            (Self::Grouped(builder), ParameterEdit::AppendToRow { row, value }) => {
                let group = builder.group_mut(*row)?;
                let end = group.len();
                group.add(end, value.clone());
                Ok(())
            }
        }
    }

    pub fn has_additions(&self) -> bool {
        match self {
            Self::Standard(builder) => builder.has_additions(),
            Self::Grouped(builder) => builder.has_additions(),
        }
    }

    /// Parameters for one unit. `rows` selects INSERT rows and is ignored
    /// by the standard builder.
    pub fn build(&self, rows: &[usize]) -> Vec<Value> {
        match self {
            Self::Standard(builder) => builder.build(),
            Self::Grouped(builder) => builder.build(rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GroupedParameterBuilder, ParameterBuilder, ParameterEdit, StandardParameterBuilder};
    use crate::backend::SqlDialect;
    use crate::sql::bind_statement;
    use crate::{ErrorCode, Value};

    fn text(value: &str) -> Value {
        Value::from(value)
    }

    #[test]
    fn replacements_apply_before_additions() {
        let mut builder = StandardParameterBuilder::new(vec![text("p0"), text("p1"), text("p2")]);
        builder.replace(1, text("x")).expect("replace");
        builder.add(1, text("y"));
        assert_eq!(builder.build(), vec![text("p0"), text("y"), text("x"), text("p2")]);
    }

    #[test]
    fn additions_past_the_end_append_in_index_order() {
        let mut builder = StandardParameterBuilder::new(vec![text("p0")]);
        builder.add(5, text("b"));
        builder.add(1, text("a"));
        builder.add(0, text("z"));
        assert_eq!(
            builder.build(),
            vec![text("z"), text("p0"), text("a"), text("b")]
        );
    }

    #[test]
    fn replacing_a_missing_parameter_is_an_invariant_violation() {
        let mut builder = StandardParameterBuilder::new(vec![text("p0")]);
        let error = builder.replace(3, text("x")).expect_err("must fail");
        assert_eq!(error.code(), ErrorCode::RewriteInvariantViolation);
    }

    #[test]
    fn grouped_builder_selects_rows_and_appends_per_row() {
        let statement = bind_statement(
            "INSERT INTO t (a, b) VALUES (?, ?), (?, 'lit'), (?, ?)",
            5,
            SqlDialect::MySql,
        )
        .expect("bind");
        let params = (0..5).map(|index| text(&format!("p{index}"))).collect::<Vec<_>>();
        let grouped = GroupedParameterBuilder::new(statement.insert.as_ref().expect("insert"), &params)
            .expect("grouped");
        let mut builder = ParameterBuilder::Grouped(grouped);
        builder
            .apply(&ParameterEdit::AppendToRow { row: 1, value: text("k1") })
            .expect("append");
        builder
            .apply(&ParameterEdit::Replace { index: 3, value: text("x") })
            .expect("replace");
        assert_eq!(builder.build(&[1, 2]), vec![text("p2"), text("k1"), text("x"), text("p4")]);
        assert_eq!(builder.build(&[0]), vec![text("p0"), text("p1")]);
    }
}
