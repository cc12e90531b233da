use std::sync::Arc;

use cel::Value as CelValue;
use serde_json::Value as JsonValue;

use crate::{ShardlineError, Value};

pub(crate) fn value_to_cel(value: &Value) -> CelValue {
    match value {
        Value::Null => CelValue::Null,
        Value::Boolean(flag) => CelValue::Bool(*flag),
        Value::Integer(number) => CelValue::Int(*number),
        Value::Real(number) => CelValue::Float(*number),
        Value::Text(text) => CelValue::String(Arc::new(text.clone())),
        Value::Blob(bytes) => CelValue::Bytes(Arc::new(bytes.clone())),
    }
}

pub(crate) fn cel_to_json(value: &CelValue) -> Result<JsonValue, ShardlineError> {
    value.json().map_err(|err| {
        ShardlineError::configuration(format!("failed to convert CEL value to JSON value: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::{cel_to_json, value_to_cel};
    use crate::Value;
    use serde_json::json;

    #[test]
    fn converts_engine_scalars() {
        let cel = value_to_cel(&Value::Text("hello".to_string()));
        assert_eq!(cel_to_json(&cel).expect("convert to JSON"), json!("hello"));
        let cel = value_to_cel(&Value::Integer(-3));
        assert_eq!(cel_to_json(&cel).expect("convert to JSON"), json!(-3));
    }
}
