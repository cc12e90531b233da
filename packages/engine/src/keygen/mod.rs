//! Key generation for INSERT statements that omit their key column.

mod resolver;
mod snowflake;
mod uuid_v7;

use std::fmt;

use crate::{ShardlineError, Value};

pub use resolver::{resolve_generated_key, GeneratedKeyContext};
pub use snowflake::{SnowflakeKeyGenerator, SystemTimeService, TimeService, SNOWFLAKE_EPOCH_MILLIS};
pub use uuid_v7::UuidKeyGenerator;

/// Produces one distributed-unique key per call.
pub trait KeyGenerateAlgorithm: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &'static str;

    fn generate_key(&self) -> Result<Value, ShardlineError>;
}
