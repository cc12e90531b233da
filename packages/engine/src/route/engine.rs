use crate::condition::{ShardingCondition, ShardingConditions};
use crate::rule::{DataNode, ShardingRule, TableRule};
use crate::sql::{StatementContext, StatementKind};
use crate::ShardlineError;

use super::{RouteContext, RouteMapper, RouteUnit};

/// Routes a bound statement.
///
/// * always-false conditions give an empty context;
/// * statements touching only broadcast tables run on every data source
///   for writes and on the first one for reads;
/// * statements touching only unconfigured tables run on the default data
///   source;
/// * sharded tables are routed per conjunctive group and the targets
///   unioned; binding tables follow the shard index of the first table of
///   their group, other sharded tables combine as a cartesian product
///   within shared data sources.
pub fn route_statement(
    statement: &StatementContext,
    conditions: &ShardingConditions,
    rule: &ShardingRule,
) -> Result<RouteContext, ShardlineError> {
    if conditions.always_false {
        tracing::debug!("conditions are always false; routing to no data source");
        return Ok(RouteContext::always_false());
    }

    let tables = statement.table_names();
    let mut sharded = Vec::new();
    let mut broadcast = Vec::new();
    let mut unconfigured = Vec::new();
    for table in &tables {
        if let Some(table_rule) = rule.table_rule(table) {
            sharded.push(table_rule);
        } else if rule.is_broadcast(table) {
            broadcast.push(table.as_str());
        } else {
            unconfigured.push(table.as_str());
        }
    }

    let context = if sharded.is_empty() {
        route_unsharded(statement, rule, &broadcast, &unconfigured)?
    } else {
        if let Some(table) = unconfigured.first() {
            return Err(ShardlineError::unsupported(format!(
                "table '{table}' is neither sharded nor broadcast and cannot be combined with \
                 sharded table '{}'",
                sharded[0].logic_table
            )));
        }
        reject_sharding_key_update(statement, rule, &sharded)?;
        if statement.kind == StatementKind::Insert {
            route_insert(sharded[0], conditions, rule)?
        } else {
            route_sharded(statement, &sharded, &broadcast, conditions, rule)?
        }
    };

    if context.units.is_empty() && !context.always_false {
        return Err(ShardlineError::unresolvable(format!(
            "statement on {tables:?} routes to no data node"
        )));
    }
    tracing::debug!(
        units = context.units.len(),
        full_route = context.full_route,
        "routed statement"
    );
    Ok(context)
}

fn route_unsharded(
    statement: &StatementContext,
    rule: &ShardingRule,
    broadcast: &[&str],
    unconfigured: &[&str],
) -> Result<RouteContext, ShardlineError> {
    let mappers = broadcast
        .iter()
        .chain(unconfigured)
        .map(|table| RouteMapper::new(table, table))
        .collect::<Vec<_>>();

    if unconfigured.is_empty() && !broadcast.is_empty() {
        let data_sources = rule.data_sources();
        let targets = if statement.kind.is_query() {
            &data_sources[..data_sources.len().min(1)]
        } else {
            data_sources
        };
        return Ok(RouteContext {
            units: targets
                .iter()
                .map(|data_source| RouteUnit::new(data_source, mappers.clone()))
                .collect(),
            full_route: !statement.kind.is_query(),
            ..RouteContext::default()
        });
    }

    let data_source = rule.default_data_source().ok_or_else(|| {
        ShardlineError::unresolvable(format!(
            "no default data source for unconfigured table(s) {unconfigured:?}"
        ))
    })?;
    Ok(RouteContext {
        units: vec![RouteUnit::new(data_source, mappers)],
        ..RouteContext::default()
    })
}

fn route_insert(
    table_rule: &TableRule,
    conditions: &ShardingConditions,
    rule: &ShardingRule,
) -> Result<RouteContext, ShardlineError> {
    let mut original_data_nodes = Vec::with_capacity(conditions.groups.len());
    let mut units: Vec<RouteUnit> = Vec::new();
    for (row, group) in conditions.groups.iter().enumerate() {
        let nodes = route_table(table_rule, &[table_rule], Some(group), rule)?;
        let [node] = nodes.as_slice() else {
            return Err(ShardlineError::unresolvable(format!(
                "VALUES row {} of '{}' routes to {} data nodes; it must route to exactly one",
                row + 1,
                table_rule.logic_table,
                nodes.len()
            )));
        };
        if !units.iter().any(|unit| unit.contains_node(node)) {
            units.push(RouteUnit::new(
                &node.data_source,
                vec![RouteMapper::new(&table_rule.logic_table, &node.table)],
            ));
        }
        original_data_nodes.push(node.clone());
    }
    Ok(RouteContext {
        units,
        original_data_nodes,
        ..RouteContext::default()
    })
}

fn route_sharded(
    statement: &StatementContext,
    sharded: &[&TableRule],
    broadcast: &[&str],
    conditions: &ShardingConditions,
    rule: &ShardingRule,
) -> Result<RouteContext, ShardlineError> {
    let full_route = conditions.is_unconstrained();
    if full_route && rule.strict_routing() {
        tracing::warn!(
            table = %sharded[0].logic_table,
            "strict routing rejected a statement without sharding condition"
        );
        return Err(ShardlineError::unresolvable(format!(
            "strict routing: {:?} statement on sharded table '{}' carries no sharding condition",
            statement.kind, sharded[0].logic_table
        )));
    }

    // Binding tables share one cluster, led by the first table seen.
    let mut clusters: Vec<Vec<&TableRule>> = Vec::new();
    for table_rule in sharded {
        match clusters
            .iter_mut()
            .find(|cluster| rule.is_binding_pair(&cluster[0].logic_table, &table_rule.logic_table))
        {
            Some(cluster) => cluster.push(table_rule),
            None => clusters.push(vec![table_rule]),
        }
    }

    let groups: Vec<Option<&ShardingCondition>> = if conditions.groups.is_empty() {
        vec![None]
    } else {
        conditions.groups.iter().map(Some).collect()
    };

    let mut routed_clusters: Vec<Vec<Vec<RouteMapper>>> = Vec::with_capacity(clusters.len());
    let mut cluster_sources: Vec<Vec<String>> = Vec::with_capacity(clusters.len());
    for cluster in &clusters {
        let head = cluster[0];
        let mut nodes: Vec<DataNode> = Vec::new();
        for group in &groups {
            for node in route_table(head, cluster, *group, rule)? {
                if !nodes.contains(&node) {
                    nodes.push(node);
                }
            }
        }
        nodes.sort_by_key(|node| {
            head.data_nodes
                .iter()
                .position(|known| known == node)
                .unwrap_or(usize::MAX)
        });

        let mut mappers_per_node = Vec::with_capacity(nodes.len());
        let mut sources = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let mut mappers = vec![RouteMapper::new(&head.logic_table, &node.table)];
            for bound in &cluster[1..] {
                mappers.push(RouteMapper::new(
                    &bound.logic_table,
                    bound_actual_table(head, bound, node)?,
                ));
            }
            mappers_per_node.push(mappers);
            sources.push(node.data_source.clone());
        }
        if nodes.is_empty() {
            tracing::debug!(
                table = %head.logic_table,
                "sharding conditions select no data node; routing to no data source"
            );
            return Ok(RouteContext::always_false());
        }
        routed_clusters.push(mappers_per_node);
        cluster_sources.push(sources);
    }

    let broadcast_mappers = broadcast
        .iter()
        .map(|table| RouteMapper::new(table, table))
        .collect::<Vec<_>>();
    let mut units = Vec::new();
    let mut data_sources: Vec<&str> = Vec::new();
    for data_source in &cluster_sources[0] {
        if !data_sources.contains(&data_source.as_str()) {
            data_sources.push(data_source);
        }
    }
    for data_source in data_sources {
        let mut combinations: Vec<Vec<RouteMapper>> = vec![Vec::new()];
        for (mappers, sources) in routed_clusters.iter().zip(&cluster_sources) {
            let local = mappers
                .iter()
                .zip(sources)
                .filter(|(_, source)| source.as_str() == data_source)
                .map(|(mappers, _)| mappers)
                .collect::<Vec<_>>();
            let mut next = Vec::with_capacity(combinations.len() * local.len());
            for prefix in &combinations {
                for suffix in &local {
                    let mut combined = prefix.clone();
                    combined.extend(suffix.iter().cloned());
                    next.push(combined);
                }
            }
            combinations = next;
        }
        for mut mappers in combinations {
            mappers.extend(broadcast_mappers.iter().cloned());
            units.push(RouteUnit::new(data_source, mappers));
        }
    }

    Ok(RouteContext {
        units,
        full_route,
        ..RouteContext::default()
    })
}

/// Data nodes of `table_rule` selected by one conjunctive group, in
/// topology order. Conditions on other tables of the binding cluster
/// stand in when the table itself is unconstrained.
fn route_table(
    table_rule: &TableRule,
    cluster: &[&TableRule],
    group: Option<&ShardingCondition>,
    rule: &ShardingRule,
) -> Result<Vec<DataNode>, ShardlineError> {
    let lookup = |column: Option<&str>| {
        let (column, group) = (column?, group?);
        cluster
            .iter()
            .find_map(|member| group.get(&member.logic_table, column))
    };

    let available_sources = table_rule.data_sources();
    let data_sources = match rule.database_strategy(table_rule) {
        Some(strategy) => strategy.do_sharding(
            &table_rule.logic_table,
            &available_sources,
            lookup(strategy.column()),
        )?,
        None => available_sources,
    };

    let mut nodes = Vec::new();
    for data_source in data_sources {
        let available_tables = table_rule.actual_tables_in(&data_source);
        let tables = match rule.table_strategy(table_rule) {
            Some(strategy) => strategy.do_sharding(
                &table_rule.logic_table,
                &available_tables,
                lookup(strategy.column()),
            )?,
            None => available_tables,
        };
        nodes.extend(
            tables
                .into_iter()
                .map(|table| DataNode::new(data_source.clone(), table)),
        );
    }
    Ok(nodes)
}

fn bound_actual_table<'a>(
    head: &TableRule,
    bound: &'a TableRule,
    node: &DataNode,
) -> Result<&'a str, ShardlineError> {
    head.actual_table_index(&node.data_source, &node.table)
        .and_then(|index| bound.actual_table_at(&node.data_source, index))
        .ok_or_else(|| {
            ShardlineError::unresolvable(format!(
                "binding table '{}' has no counterpart for {node}",
                bound.logic_table
            ))
        })
}

fn reject_sharding_key_update(
    statement: &StatementContext,
    rule: &ShardingRule,
    sharded: &[&TableRule],
) -> Result<(), ShardlineError> {
    let Some(update) = &statement.update else {
        return Ok(());
    };
    for assignment in &update.assignments {
        if let Some(table) = sharded
            .iter()
            .find(|table| rule.is_sharding_column(&table.logic_table, &assignment.column.name))
        {
            return Err(ShardlineError::unsupported(format!(
                "UPDATE cannot change sharding column '{}.{}'",
                table.logic_table, assignment.column.name
            )));
        }
    }
    Ok(())
}
