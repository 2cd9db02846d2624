//! Parameter values and their canonical form

use core::fmt;

use serde_json::Value;

use crate::error::{Error, Result};

/// A single configuration parameter value
///
/// Values are kept in normalized form: floats without a fractional part are
/// stored as integers and non-finite floats are never constructed.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer value
    Integer(i64),
    /// Fractional value
    Float(f64),
    /// Text value (e.g. a mode name)
    Text(String),
    /// Boolean value
    Bool(bool),
}

impl ParamValue {
    /// Build a float value, normalizing integral floats and rejecting NaN/inf
    ///
    /// Integral floats outside the `i64` range are rejected rather than
    /// clamped.
    pub fn float(v: f64) -> Result<Self> {
        if !v.is_finite() {
            return Err(Error::invalid(format!("non-finite number {}", v)));
        }
        if v.fract() != 0.0 {
            return Ok(Self::Float(v));
        }
        // i64::MAX as f64 rounds up to 2^63, which is already out of range
        if v >= i64::MIN as f64 && v < i64::MAX as f64 {
            Ok(Self::Integer(v as i64))
        } else {
            Err(Error::invalid(format!("integral number {} is out of range", v)))
        }
    }

    /// Convert from a JSON value
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Self::float(f)
                } else {
                    Err(Error::invalid(format!("unsupported number {}", n)))
                }
            }
            Value::Null => Err(Error::invalid("null is not a parameter value")),
            Value::Array(_) | Value::Object(_) => {
                Err(Error::invalid("nested values are not parameter values"))
            }
        }
    }

    /// Canonical JSON form used for hashing and reports
    pub fn to_json(&self) -> Value {
        match self {
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
            Self::Bool(b) => Value::Bool(*b),
        }
    }

    /// Numeric view of the value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view of the value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => write!(f, "\"{}\"", s),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}
