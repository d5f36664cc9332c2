use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use docshape::{Adapter, AdapterConfig, Converters, DbError, SchemaValidator};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "docshape")]
#[command(about = "Derive document collection definitions and validators from JSON schemas", long_about = None)]
struct Args {
    /// TOML configuration file (defaults plus DOCSHAPE_* variables when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the storage and/or validation definition of a schema file
    Convert {
        schema: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Target::Both)]
        target: Target,

        #[arg(long)]
        pretty: bool,
    },
    /// Check a JSON document against a schema file
    Validate { schema: PathBuf, document: PathBuf },
    /// Provision a collection for every `*.json` schema in a directory
    Sync { schemas: PathBuf },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Target {
    Storage,
    Validation,
    Both,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docshape=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => AdapterConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AdapterConfig::from_env()?,
    };

    match args.command {
        Command::Convert {
            schema,
            target,
            pretty,
        } => convert(&config, &schema, target, pretty),
        Command::Validate { schema, document } => validate(&config, &schema, &document),
        Command::Sync { schemas } => sync(config, &schemas).await,
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn print_json(value: &Value, pretty: bool) -> anyhow::Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", rendered);
    Ok(())
}

fn convert(config: &AdapterConfig, path: &Path, target: Target, pretty: bool) -> anyhow::Result<()> {
    let schema = read_json(path)?;
    let converters = Converters::new(&config.converter);

    let output = match target {
        Target::Storage => converters.schema.convert(&schema)?,
        Target::Validation => converters.validator.convert(&schema)?,
        Target::Both => serde_json::json!({
            "storage": converters.schema.convert(&schema)?,
            "validation": converters.validator.convert(&schema)?,
        }),
    };
    print_json(&output, pretty)
}

fn validate(config: &AdapterConfig, schema_path: &Path, document_path: &Path) -> anyhow::Result<()> {
    let schema = read_json(schema_path)?;
    let document = read_json(document_path)?;

    let name = schema_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("schema");
    let definition = Converters::new(&config.converter).validator.convert(&schema)?;
    let validator = SchemaValidator::new(name, definition)?;

    match validator.validate(&document) {
        Ok(()) => {
            println!("{} is valid", document_path.display());
            Ok(())
        }
        Err(DbError::ValidationFailed(violations)) => {
            for violation in &violations {
                println!(
                    "{}: {}",
                    if violation.instance_path.is_empty() {
                        "/"
                    } else {
                        violation.instance_path.as_str()
                    },
                    violation.error
                );
            }
            anyhow::bail!("{} violation(s) in {}", violations.len(), document_path.display())
        }
        Err(e) => Err(e.into()),
    }
}

async fn sync(config: AdapterConfig, dir: &Path) -> anyhow::Result<()> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut adapter = Adapter::new(config);
    for path in &paths {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .with_context(|| format!("unusable schema file name {}", path.display()))?
            .to_string();
        adapter.define(&name, read_json(path)?);
    }

    adapter.sync().await?;
    for table in adapter.tables() {
        println!("{}", table);
    }
    adapter.disconnect().await?;
    Ok(())
}
