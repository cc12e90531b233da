use crate::cel::CelEvaluator;
use crate::config::Props;
use crate::rule::inline::{render_inline_template, template_placeholders};
use crate::ShardlineError;

use super::{PreciseShardingValue, RangeShardingValue, ShardingAlgorithm};

/// Target name computed from `algorithm-expression`, a template whose
/// placeholders are CEL expressions over the sharding column.
#[derive(Debug)]
pub struct InlineShardingAlgorithm {
    expression: String,
    allow_range_query: bool,
    evaluator: CelEvaluator,
}

impl InlineShardingAlgorithm {
    pub fn new(expression: &str, allow_range_query: bool) -> Result<Self, ShardlineError> {
        let evaluator = CelEvaluator::new();
        let placeholders = template_placeholders(expression)?;
        if placeholders.is_empty() {
            return Err(ShardlineError::configuration(format!(
                "algorithm-expression '{expression}' has no placeholder"
            )));
        }
        for placeholder in &placeholders {
            evaluator.validate(placeholder.trim())?;
        }
        Ok(Self {
            expression: expression.to_string(),
            allow_range_query,
            evaluator,
        })
    }

    pub fn from_props(props: &Props) -> Result<Self, ShardlineError> {
        Self::new(
            &props.require_str("algorithm-expression")?,
            props
                .get_bool("allow-range-query-with-inline-sharding")?
                .unwrap_or(false),
        )
    }
}

impl ShardingAlgorithm for InlineShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "INLINE"
    }

    fn do_precise_sharding(
        &self,
        available_targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> Result<Option<String>, ShardlineError> {
        let target = render_inline_template(
            &self.expression,
            &[(value.column, value.value)],
            &self.evaluator,
        )?;
        Ok(available_targets
            .iter()
            .find(|candidate| candidate.eq_ignore_ascii_case(&target))
            .cloned())
    }

    fn do_range_sharding(
        &self,
        available_targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> Result<Vec<String>, ShardlineError> {
        if !self.allow_range_query {
            return Err(ShardlineError::unsupported(format!(
                "range condition on '{}.{}' with INLINE sharding; set \
                 allow-range-query-with-inline-sharding to route it to every target",
                value.logic_table, value.column
            )));
        }
        Ok(available_targets.to_vec())
    }
}
