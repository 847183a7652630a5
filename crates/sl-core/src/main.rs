//! sltool - inspect and convert structured log schemas and event blobs.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use sl_core::{
    encode_blob, init_logging, load_schema, log_validation_error, serialize_blob,
    serialize_json_schema, Error, ExitCode, LogFormat, Result, ToolConfig,
};
use sl_json::{IoConsumer, JsonSerializer};
use sl_tree::{read_image, write_image, JsonNode};
use tracing::{debug, error, info};

/// Convert structured log event blobs to JSON and back.
#[derive(Parser)]
#[command(name = "sltool")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true, env = "SLTOOL_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    /// Log filter directives (e.g. "debug" or "sl_core=trace")
    #[arg(long, global = true)]
    log_filter: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Indent width for pretty output
    #[arg(long, global = true)]
    indent: Option<usize>,

    /// Skip blob validation and serializer checks
    #[arg(long, global = true)]
    no_validate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a schema document and print it normalized
    Schema {
        /// Path to the schema JSON file
        schema: PathBuf,
    },

    /// Encode a JSON event into a blob
    Encode {
        /// Path to the schema JSON file
        schema: PathBuf,

        /// Path to the event JSON file
        data: PathBuf,

        /// Where to write the blob
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the JSON event stored in a blob
    Transcode {
        /// Path to the schema JSON file
        schema: PathBuf,

        /// Path to the blob
        blob: PathBuf,
    },

    /// Write a schema's node image, or read one back as a schema document
    Image {
        /// Path to the schema JSON file
        #[arg(required_unless_present = "read", conflicts_with = "read")]
        schema: Option<PathBuf>,

        /// Where to write the image
        #[arg(short, long, requires = "schema")]
        output: Option<PathBuf>,

        /// Image file to read and print as a schema
        #[arg(long)]
        read: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(()) => ExitCode::Clean,
        Err(err) => {
            error!(code = err.code(), "{err}");
            eprintln!("sltool: {err}");
            ExitCode::from(&err)
        }
    };
    std::process::exit(code.as_i32());
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    init_logging(&config.log)?;
    debug!(?config, "resolved configuration");

    match cli.command {
        Commands::Schema { schema } => {
            let root = read_schema(&schema)?;
            print_json(&config, |serial| serialize_json_schema(serial, &root))
        }
        Commands::Encode {
            schema,
            data,
            output,
        } => {
            let root = read_schema(&schema)?;
            let text = fs::read_to_string(&data)?;
            let event: serde_json::Value = serde_json::from_str(&text)?;
            let blob = encode_blob(&root, &event)?;
            fs::write(&output, &blob)?;
            info!(path = %output.display(), size = blob.len(), "wrote blob");
            Ok(())
        }
        Commands::Transcode { schema, blob } => {
            let root = read_schema(&schema)?;
            let blob = fs::read(&blob)?;
            print_json(&config, |serial| serialize_blob(serial, &root, &blob))
        }
        Commands::Image {
            schema,
            output,
            read,
        } => match (schema, read) {
            (_, Some(image)) => {
                let root = read_image(&fs::read(&image)?)?;
                print_json(&config, |serial| serialize_json_schema(serial, &root))
            }
            (Some(schema), None) => {
                let root = read_schema(&schema)?;
                let image = write_image(&root)?;
                match output {
                    Some(path) => {
                        fs::write(&path, &image)?;
                        info!(path = %path.display(), size = image.len(), "wrote node image");
                    }
                    None => io::stdout().lock().write_all(&image)?,
                }
                Ok(())
            }
            (None, None) => Err(Error::Config("image needs a schema or --read".into())),
        },
    }
}

/// Defaults, then file, then environment, then flags.
fn resolve_config(cli: &Cli) -> Result<ToolConfig> {
    let mut config = ToolConfig::resolve(cli.config.as_deref())?;
    if let Some(format) = cli.log_format {
        config.log.format = format;
    }
    if let Some(filter) = &cli.log_filter {
        config.log.filter = filter.clone();
    }
    if cli.pretty {
        config.output.pretty = true;
    }
    if let Some(indent) = cli.indent {
        config.output.indent = indent;
    }
    if cli.no_validate {
        config.output.validate = false;
    }
    config.validate()?;
    Ok(config)
}

fn read_schema(path: &Path) -> Result<JsonNode> {
    let text = fs::read_to_string(path)?;
    let doc: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| Error::Schema(format!("{}: {e}", path.display())))?;
    load_schema(&doc)
}

/// Run `write` against a serializer over stdout.
fn print_json<F>(config: &ToolConfig, write: F) -> Result<()>
where
    F: FnOnce(&mut JsonSerializer<IoConsumer<io::StdoutLock<'static>>>) -> Result<()>,
{
    let consumer = IoConsumer::new(io::stdout().lock());
    let mut serial = JsonSerializer::with_options(consumer, config.serializer_options())
        .with_validation_hook(log_validation_error);
    write(&mut serial)?;

    let mut stdout = serial.into_consumer().finish()?;
    if !config.output.pretty {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
