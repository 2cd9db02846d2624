//! Canonical JSON rendering

use serde::Serialize;
use serde_json::{Number, Value};

use crate::error::{Error, Result};

/// Normalize numbers in a JSON tree
///
/// Floats without a fractional part become integers, which also folds
/// `-0.0` into `0`. Object keys are already sorted by `serde_json::Map`.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(canonical_number(n)),
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect(),
        ),
        other => other,
    }
}

fn canonical_number(n: Number) -> Number {
    if n.is_i64() || n.is_u64() {
        return n;
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
            Number::from(f as i64)
        }
        _ => n,
    }
}

/// Render `report` as canonical, pretty-printed JSON with a trailing newline
pub fn render<T: Serialize>(report: &T) -> Result<String> {
    let value = serde_json::to_value(report)
        .map_err(|e| Error::invalid(format!("report is not serializable: {}", e)))?;
    let mut out = serde_json::to_string_pretty(&canonicalize(value))
        .map_err(|e| Error::invalid(format!("report is not serializable: {}", e)))?;
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_numbers_are_normalized() {
        let v = canonicalize(json!({"a": 2.0, "b": -0.0, "c": 0.25, "d": [1.0, 3]}));
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"{"a":2,"b":0,"c":0.25,"d":[1,3]}"#);
    }

    #[test]
    fn test_render_is_order_independent() {
        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for (k, v) in [("zeta", 1.5), ("alpha", 2.0), ("mid", -0.0)] {
            first.insert(k, v);
        }
        for (k, v) in [("mid", 0.0), ("zeta", 1.5), ("alpha", 2.0)] {
            second.insert(k, v);
        }
        let a = render(&first).unwrap();
        assert_eq!(a, render(&second).unwrap());
        assert_eq!(a, "{\n  \"alpha\": 2,\n  \"mid\": 0,\n  \"zeta\": 1.5\n}\n");
    }
}
