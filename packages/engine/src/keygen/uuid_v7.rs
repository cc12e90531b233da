use crate::{ShardlineError, Value};

use super::KeyGenerateAlgorithm;

/// Time-ordered UUID (v7) keys rendered as text.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidKeyGenerator;

impl KeyGenerateAlgorithm for UuidKeyGenerator {
    fn type_name(&self) -> &'static str {
        "UUID"
    }

    fn generate_key(&self) -> Result<Value, ShardlineError> {
        Ok(Value::Text(uuid::Uuid::now_v7().to_string()))
    }
}
