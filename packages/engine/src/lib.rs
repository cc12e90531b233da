//! Routing, rewriting and result merging for a sharding SQL middleware.
//!
//! A logical statement flows through [`sql::bind_statement`],
//! [`keygen::resolve_generated_key`], [`condition::extract_sharding_conditions`],
//! [`route::route_statement`] and [`rewrite::RewriteEngine`]; the per-unit
//! results come back through [`merge::merge_query_results`]. [`Shardline`]
//! wires the stages to a set of [`ShardBackend`]s.

mod backend;
mod cel;
mod error;
mod shardline;
mod types;

pub mod algorithm;
pub mod condition;
pub mod config;
pub mod execute;
pub mod keygen;
pub mod merge;
pub mod rewrite;
pub mod route;
pub mod rule;
pub mod sql;

pub use algorithm::{AlgorithmFactory, ShardingAlgorithm};
pub use backend::{ShardBackend, SqlDialect};
pub use config::ShardingRuleConfig;
pub use error::{ErrorCode, ShardlineError};
pub use keygen::KeyGenerateAlgorithm;
pub use merge::QueryResultCursor;
pub use rule::{DataNode, KeyGenerateStrategy, ShardingRule, ShardingStrategy, TableRule};
pub use shardline::{open_shardline, ExecuteOutcome, ExecutionPlan, OpenShardlineConfig, Shardline};
pub use types::{QueryResult, Value};
