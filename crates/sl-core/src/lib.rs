//! Schema-driven transcoding of structured log events.
//!
//! An event travels as a compact blob holding only its variable fields. The
//! schema tree ([`sl_tree::JsonNode`]) says how to read them back:
//!
//! - [`transcode`] turns a blob into JSON text through a [`sl_json::JsonSerializer`].
//! - [`encode`] writes a JSON document into a blob with the same layout.
//! - [`schema`] dumps a schema tree as JSON and loads one back.
//!
//! [`config`], [`logging`] and [`exit_codes`] support the `sltool` binary.

pub mod config;
pub mod encode;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod schema;
pub mod transcode;

mod value;

pub use config::{LogConfig, LogFormat, OutputConfig, ToolConfig};
pub use encode::{encode_blob, encode_value};
pub use error::{Error, Result};
pub use exit_codes::ExitCode;
pub use logging::{init_logging, log_validation_error};
pub use schema::{load_schema, parse_type_name, serialize_json_schema, type_name};
pub use transcode::{serialize_blob, serialize_json_tree};
