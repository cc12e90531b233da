//! Routing: sharding conditions plus topology in, route units out.

mod engine;

use crate::rule::DataNode;

pub use engine::route_statement;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteMapper {
    pub logic_name: String,
    pub actual_name: String,
}

impl RouteMapper {
    pub fn new(logic_name: &str, actual_name: &str) -> Self {
        Self {
            logic_name: logic_name.to_string(),
            actual_name: actual_name.to_string(),
        }
    }
}

/// One physical execution target: a data source plus the actual table
/// standing in for each logic table of the statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteUnit {
    pub data_source: String,
    pub table_mappers: Vec<RouteMapper>,
}

impl RouteUnit {
    pub fn new(data_source: &str, table_mappers: Vec<RouteMapper>) -> Self {
        Self {
            data_source: data_source.to_string(),
            table_mappers,
        }
    }

    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.table_mappers
            .iter()
            .find(|mapper| mapper.logic_name.eq_ignore_ascii_case(logic_table))
            .map(|mapper| mapper.actual_name.as_str())
    }

    pub fn contains_node(&self, node: &DataNode) -> bool {
        self.data_source == node.data_source
            && self
                .table_mappers
                .iter()
                .any(|mapper| mapper.actual_name == node.table)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteContext {
    pub units: Vec<RouteUnit>,
    /// The statement can match no row; nothing is sent anywhere.
    pub always_false: bool,
    /// No sharding condition narrowed the route.
    pub full_route: bool,
    /// For INSERT, the data node of each VALUES row in row order.
    pub original_data_nodes: Vec<DataNode>,
}

impl RouteContext {
    pub fn always_false() -> Self {
        Self {
            always_false: true,
            ..Self::default()
        }
    }

    pub fn is_single_unit(&self) -> bool {
        self.units.len() == 1
    }

    pub fn data_sources(&self) -> Vec<&str> {
        let mut data_sources: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !data_sources.contains(&unit.data_source.as_str()) {
                data_sources.push(&unit.data_source);
            }
        }
        data_sources
    }
}
