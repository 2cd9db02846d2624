//! Config schema v1 validation and hashing

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::ParamValue;
use crate::error::{Error, Result};

/// The only configuration schema version this crate understands
pub const CONFIG_SCHEMA_VERSION: &str = "v1";

/// Closed set of schema v1 parameters
///
/// Variants are declared in key order so that `Ord` matches the sorted
/// string form used for hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfigKey {
    /// Raw controller configuration word
    Config,
    /// Current limit applied to both channels
    MaxCurrent,
    /// Current limit for motor 1
    MaxCurrentM1,
    /// Current limit for motor 2
    MaxCurrentM2,
    /// Control mode (low two bits of the config word, or a mode name)
    Mode,
}

impl ConfigKey {
    /// All keys in sorted order
    pub const ALL: [ConfigKey; 5] = [
        ConfigKey::Config,
        ConfigKey::MaxCurrent,
        ConfigKey::MaxCurrentM1,
        ConfigKey::MaxCurrentM2,
        ConfigKey::Mode,
    ];

    /// Parameter name as it appears in config documents
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::MaxCurrent => "max_current",
            Self::MaxCurrentM1 => "max_current_m1",
            Self::MaxCurrentM2 => "max_current_m2",
            Self::Mode => "mode",
        }
    }

    /// Check that `value` is acceptable for this key
    pub fn validate(self, value: &ParamValue) -> Result<()> {
        let ok = match self {
            Self::Config => value.as_i64().is_some_and(|v| (0..=0xFFFF).contains(&v)),
            Self::Mode => match value {
                ParamValue::Integer(v) => (0..=3).contains(v),
                ParamValue::Text(s) => !s.trim().is_empty(),
                _ => false,
            },
            Self::MaxCurrent | Self::MaxCurrentM1 | Self::MaxCurrentM2 => {
                value.as_f64().is_some_and(|v| v >= 0.0)
            }
        };

        if ok {
            Ok(())
        } else {
            Err(Error::invalid(format!(
                "invalid value {} for parameter '{}'",
                value,
                self.as_str()
            )))
        }
    }
}

impl FromStr for ConfigKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ConfigKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::invalid(format!("unsupported config parameter '{}'", s)))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for ConfigKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A validated configuration payload
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigPayload {
    schema_version: String,
    parameters: BTreeMap<ConfigKey, ParamValue>,
}

impl ConfigPayload {
    /// Build a payload from named parameters
    ///
    /// Fails with `InvalidInput` on an unsupported schema version, an unknown
    /// parameter name, a duplicated name or a value out of range.
    pub fn new<I, K>(schema_version: &str, parameters: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, ParamValue)>,
        K: AsRef<str>,
    {
        check_schema_version(schema_version)?;

        let mut map = BTreeMap::new();
        let mut unknown = Vec::new();
        for (name, value) in parameters {
            let name = name.as_ref();
            let key = match name.parse::<ConfigKey>() {
                Ok(key) => key,
                Err(_) => {
                    unknown.push(name.to_string());
                    continue;
                }
            };
            key.validate(&value)?;
            if map.insert(key, value).is_some() {
                return Err(Error::invalid(format!("duplicate parameter '{}'", key)));
            }
        }

        if !unknown.is_empty() {
            unknown.sort();
            return Err(Error::invalid(format!(
                "unsupported config parameter(s): {}",
                unknown.join(", ")
            )));
        }

        Ok(Self {
            schema_version: schema_version.to_string(),
            parameters: map,
        })
    }

    /// Build a schema v1 payload from typed parameters (e.g. a device read-back)
    pub fn from_parameters(parameters: BTreeMap<ConfigKey, ParamValue>) -> Result<Self> {
        for (key, value) in &parameters {
            key.validate(value)?;
        }
        Ok(Self {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            parameters,
        })
    }

    /// Parse a config document (`{"schema_version": .., "parameters": {..}}`)
    ///
    /// Other top-level keys, such as those written by a dump, are ignored.
    pub fn from_json_value(doc: &Value) -> Result<Self> {
        let obj = doc
            .as_object()
            .ok_or_else(|| Error::invalid("configuration must be a JSON object"))?;

        let schema_version = match obj.get("schema_version") {
            Some(Value::String(s)) if !s.is_empty() => s.as_str(),
            _ => return Err(Error::invalid("config.schema_version must be a non-empty string")),
        };
        check_schema_version(schema_version)?;

        let params = obj
            .get("parameters")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::invalid("config.parameters must be an object"))?;

        let mut converted = Vec::with_capacity(params.len());
        for (name, value) in params {
            let value = ParamValue::from_json(value)
                .map_err(|e| Error::invalid(format!("parameter '{}': {}", name, e)))?;
            converted.push((name.as_str(), value));
        }

        Self::new(schema_version, converted)
    }

    /// Parse a config document from JSON text
    pub fn from_json_str(s: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(s)
            .map_err(|e| Error::invalid(format!("configuration is not valid JSON: {}", e)))?;
        Self::from_json_value(&doc)
    }

    /// Schema version tag
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Parameters in key order
    pub fn parameters(&self) -> &BTreeMap<ConfigKey, ParamValue> {
        &self.parameters
    }

    /// Value of a single parameter
    pub fn get(&self, key: ConfigKey) -> Option<&ParamValue> {
        self.parameters.get(&key)
    }

    /// Parameters as a sorted JSON object with canonical values
    pub fn parameters_json(&self) -> Value {
        let map: Map<String, Value> = self
            .parameters
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_json()))
            .collect();
        Value::Object(map)
    }

    /// SHA-256 over the canonical `(schema_version, parameters)` form
    ///
    /// Independent of the order parameters were supplied in.
    pub fn config_hash(&self) -> String {
        let mut doc = Map::new();
        doc.insert("parameters".into(), self.parameters_json());
        doc.insert(
            "schema_version".into(),
            Value::String(self.schema_version.clone()),
        );
        // serde_json maps are sorted and to_string is compact
        let normalized = Value::Object(doc).to_string();

        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn check_schema_version(schema_version: &str) -> Result<()> {
    if schema_version != CONFIG_SCHEMA_VERSION {
        return Err(Error::invalid(format!(
            "unsupported schema_version: {}",
            schema_version
        )));
    }
    Ok(())
}
