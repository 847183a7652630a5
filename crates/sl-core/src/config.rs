//! `sltool` configuration.
//!
//! Resolution order, lowest to highest: defaults, the TOML file, `SLTOOL_*`
//! environment variables, command line flags. The CLI applies the flags
//! itself after [`ToolConfig::apply_env`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use sl_json::SerializerOptions;

use crate::{Error, Result};

/// Widest pretty-print indent accepted.
pub const MAX_INDENT: usize = 32;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SLTOOL_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub output: OutputConfig,
    pub log: LogConfig,
}

/// How transcoded JSON is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub pretty: bool,
    pub indent: usize,
    /// Validate blobs while reading them and check serializer call order.
    pub validate: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pretty: false,
            indent: 4,
            validate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `warn` or `sl_core=debug`.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Compact,
            filter: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::Config(format!("unknown log format '{other}'"))),
        }
    }
}

impl ToolConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Resolve the file from an explicit path or `SLTOOL_CONFIG`, then apply
    /// environment overrides. Without either, start from the defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_ENV);
        let mut config = match path.or(from_env.as_deref().map(Path::new)) {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `SLTOOL_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SLTOOL_PRETTY") {
            self.output.pretty = parse_bool("SLTOOL_PRETTY", &v)?;
        }
        if let Some(v) = lookup("SLTOOL_INDENT") {
            self.output.indent = v
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("SLTOOL_INDENT: '{v}' is not a number")))?;
        }
        if let Some(v) = lookup("SLTOOL_VALIDATE") {
            self.output.validate = parse_bool("SLTOOL_VALIDATE", &v)?;
        }
        if let Some(v) = lookup("SLTOOL_LOG_FORMAT") {
            self.log.format = v.trim().parse()?;
        }
        if let Some(v) = lookup("SLTOOL_LOG") {
            self.log.filter = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.output.indent > MAX_INDENT {
            return Err(Error::Config(format!(
                "output.indent is {}, the maximum is {MAX_INDENT}",
                self.output.indent
            )));
        }
        Ok(())
    }

    pub fn serializer_options(&self) -> SerializerOptions {
        SerializerOptions {
            validate: self.output.validate,
            pretty_print: self.output.pretty,
            indent: self.output.indent,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key}: '{value}' is not a boolean"))),
    }
}
