use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{AlgorithmConfig, Props};
use crate::keygen::{KeyGenerateAlgorithm, SnowflakeKeyGenerator, UuidKeyGenerator};
use crate::ShardlineError;

use super::{
    HashModShardingAlgorithm, InlineShardingAlgorithm, IntervalShardingAlgorithm,
    ModShardingAlgorithm, RangeShardingAlgorithm, ShardingAlgorithm,
};

pub type ShardingAlgorithmConstructor =
    Arc<dyn Fn(&Props) -> Result<Arc<dyn ShardingAlgorithm>, ShardlineError> + Send + Sync>;

pub type KeyGeneratorConstructor =
    Arc<dyn Fn(&Props) -> Result<Arc<dyn KeyGenerateAlgorithm>, ShardlineError> + Send + Sync>;

/// Builds algorithms from their configured type name. Type names are
/// matched case-insensitively.
#[derive(Clone)]
pub struct AlgorithmFactory {
    sharding: HashMap<String, ShardingAlgorithmConstructor>,
    key_generators: HashMap<String, KeyGeneratorConstructor>,
}

impl fmt::Debug for AlgorithmFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sharding = self.sharding.keys().collect::<Vec<_>>();
        sharding.sort();
        let mut key_generators = self.key_generators.keys().collect::<Vec<_>>();
        key_generators.sort();
        f.debug_struct("AlgorithmFactory")
            .field("sharding", &sharding)
            .field("key_generators", &key_generators)
            .finish()
    }
}

impl Default for AlgorithmFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl AlgorithmFactory {
    pub fn empty() -> Self {
        Self {
            sharding: HashMap::new(),
            key_generators: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut factory = Self::empty();
        factory.register_sharding("MOD", |props| {
            Ok(Arc::new(ModShardingAlgorithm::from_props(props)?))
        });
        factory.register_sharding("HASH_MOD", |props| {
            Ok(Arc::new(HashModShardingAlgorithm::from_props(props)?))
        });
        factory.register_sharding("VOLUME_RANGE", |props| {
            Ok(Arc::new(RangeShardingAlgorithm::volume_from_props(props)?))
        });
        factory.register_sharding("BOUNDARY_RANGE", |props| {
            Ok(Arc::new(RangeShardingAlgorithm::boundaries_from_props(props)?))
        });
        factory.register_sharding("INTERVAL", |props| {
            Ok(Arc::new(IntervalShardingAlgorithm::from_props(props)?))
        });
        factory.register_sharding("INLINE", |props| {
            Ok(Arc::new(InlineShardingAlgorithm::from_props(props)?))
        });
        factory.register_key_generator("SNOWFLAKE", |props| {
            Ok(Arc::new(SnowflakeKeyGenerator::from_props(props)?))
        });
        factory.register_key_generator("UUID", |_| Ok(Arc::new(UuidKeyGenerator)));
        factory
    }

    /// Registers (or replaces) a sharding algorithm type.
    pub fn register_sharding<F>(&mut self, type_name: &str, constructor: F)
    where
        F: Fn(&Props) -> Result<Arc<dyn ShardingAlgorithm>, ShardlineError> + Send + Sync + 'static,
    {
        self.sharding
            .insert(type_name.to_ascii_uppercase(), Arc::new(constructor));
    }

    pub fn register_key_generator<F>(&mut self, type_name: &str, constructor: F)
    where
        F: Fn(&Props) -> Result<Arc<dyn KeyGenerateAlgorithm>, ShardlineError>
            + Send
            + Sync
            + 'static,
    {
        self.key_generators
            .insert(type_name.to_ascii_uppercase(), Arc::new(constructor));
    }

    pub fn create_sharding(
        &self,
        config: &AlgorithmConfig,
    ) -> Result<Arc<dyn ShardingAlgorithm>, ShardlineError> {
        let constructor = self
            .sharding
            .get(&config.kind.to_ascii_uppercase())
            .ok_or_else(|| {
                ShardlineError::configuration(format!(
                    "unknown sharding algorithm type '{}'",
                    config.kind
                ))
            })?;
        constructor(&config.props)
    }

    pub fn create_key_generator(
        &self,
        config: &AlgorithmConfig,
    ) -> Result<Arc<dyn KeyGenerateAlgorithm>, ShardlineError> {
        let constructor = self
            .key_generators
            .get(&config.kind.to_ascii_uppercase())
            .ok_or_else(|| {
                ShardlineError::configuration(format!(
                    "unknown key generator type '{}'",
                    config.kind
                ))
            })?;
        constructor(&config.props)
    }
}

#[cfg(test)]
mod tests {
    use super::AlgorithmFactory;
    use crate::algorithm::{
        ModShardingAlgorithm, PreciseShardingValue, ShardingAlgorithm,
    };
    use crate::config::{AlgorithmConfig, Props};
    use crate::{ErrorCode, Value};
    use std::sync::Arc;

    #[test]
    fn builds_builtin_algorithms_case_insensitively() {
        let factory = AlgorithmFactory::with_builtins();
        let algorithm = factory
            .create_sharding(&AlgorithmConfig::new(
                "mod",
                Props::new().with("sharding-count", 4),
            ))
            .expect("mod");
        assert_eq!(algorithm.type_name(), "MOD");
        let generator = factory
            .create_key_generator(&AlgorithmConfig::new("Snowflake", Props::new()))
            .expect("snowflake");
        assert_eq!(generator.type_name(), "SNOWFLAKE");
    }

    #[test]
    fn unknown_types_are_configuration_errors() {
        let error = AlgorithmFactory::with_builtins()
            .create_sharding(&AlgorithmConfig::new("CONSISTENT_HASH", Props::new()))
            .expect_err("must fail");
        assert_eq!(error.code(), ErrorCode::Configuration);
    }

    #[test]
    fn custom_algorithms_can_be_registered() {
        let mut factory = AlgorithmFactory::empty();
        factory.register_sharding("ALWAYS_ZERO", |_| Ok(Arc::new(ModShardingAlgorithm::new(1)?)));
        let algorithm = factory
            .create_sharding(&AlgorithmConfig::new("always_zero", Props::new()))
            .expect("custom");
        let value = Value::Integer(42);
        let target = algorithm
            .do_precise_sharding(
                &["t_0".to_string()],
                &PreciseShardingValue {
                    logic_table: "t",
                    column: "id",
                    value: &value,
                },
            )
            .expect("precise");
        assert_eq!(target.as_deref(), Some("t_0"));
    }
}
