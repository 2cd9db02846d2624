//! Configuration schema v1
//!
//! A configuration payload is a schema version plus a closed set of
//! controller parameters. Payloads are validated when they are built, so a
//! `ConfigPayload` value is always safe to hand to the flasher.

mod schema;
mod value;

pub use schema::{ConfigKey, ConfigPayload, CONFIG_SCHEMA_VERSION};
pub use value::ParamValue;
