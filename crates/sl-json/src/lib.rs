//! Streaming JSON output for structured log events.
//!
//! [`JsonSerializer`] turns a sequence of key, value and scope calls into JSON
//! text and hands it to a [`JsonConsumer`] fragment by fragment. Nothing is
//! buffered beyond a single number or escape sequence, so the consumer decides
//! where the text goes: a growable buffer, a fixed slice, an `io::Write`, or
//! nowhere at all when only the length is wanted.

pub mod consumer;
pub mod error;
pub mod serializer;

pub use consumer::{IoConsumer, JsonConsumer, JsonLengthCounter, JsonPrinter};
pub use error::{Result, SerializeError};
pub use serializer::{JsonSerializer, JsonValue, Scope, SerializerOptions};

/// Callback that receives validation messages.
pub type ValidationHook = fn(&str);

/// Default hook: drops the message.
pub fn ignore_validation_error(_message: &str) {}
