//! Command-line front end for the twinreg registry.
//!
//! Every subcommand runs one registry operation against the backend named by
//! `--config` or the `TWINREG_*` environment and prints the result as pretty
//! JSON on stdout.
//!
//! Exit codes: 0 = success, 1 = shell or submodel not found, 2 = any other
//! error.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use twinreg_core::{SearchRequest, ShellDescriptor, SortDirection, SubmodelDescriptor};
use twinreg_storage::{build_registry, RegistryConfig, RegistryError, ShellRegistry};

/// Digital-twin descriptor registry tools.
#[derive(Parser)]
#[command(name = "twinreg", about = "Digital-twin descriptor registry tools")]
struct Cli {
    /// JSON configuration file (default: TWINREG_* environment variables).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register or replace shells from a JSON file (one shell or an array).
    Put { file: PathBuf },

    /// Print one shell.
    Get { id: String },

    /// Print every shell.
    List,

    /// Remove one shell.
    Remove { id: String },

    /// Remove every shell and print the removed ids.
    Clear,

    /// Print the submodels of a shell.
    Submodels { shell: String },

    /// Add or replace a submodel of an existing shell from a JSON file.
    PutSubmodel { shell: String, file: PathBuf },

    /// Remove one submodel from a shell.
    RemoveSubmodel { shell: String, submodel: String },

    /// Search shells.
    Search {
        /// Field path to query, e.g. `idShort` or `submodelDescriptors.idShort`.
        #[arg(long, requires = "value")]
        path: Option<String>,

        /// Text to match, or the pattern with `--regex`.
        #[arg(long, requires = "path")]
        value: Option<String>,

        /// Treat the value as an anchored regular expression.
        #[arg(long)]
        regex: bool,

        /// Sort key as `field[:asc|desc]`; repeatable.
        #[arg(long, value_parser = parse_sort_key)]
        sort: Vec<(String, SortDirection)>,

        /// Zero-based page index.
        #[arg(long, requires = "size")]
        page: Option<u32>,

        /// Page size.
        #[arg(long)]
        size: Option<u32>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("cannot read {path}: {source}")]
    Input {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Registry(e) if e.is_not_found() => 1,
            _ => 2,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<ShellDescriptor>),
    One(Box<ShellDescriptor>),
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error: failed to serialize output: {e}");
                process::exit(2);
            }
        },
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(e.exit_code());
        }
    }
}

fn run(cli: Cli) -> Result<Value, CliError> {
    let config = match &cli.config {
        Some(path) => RegistryConfig::from_json_file(path)?,
        None => RegistryConfig::from_env()?,
    };
    let registry = build_registry(&config)?;
    execute(registry, cli.command)
}

fn execute(registry: Arc<dyn ShellRegistry>, command: Commands) -> Result<Value, CliError> {
    let output = match command {
        Commands::Put { file } => {
            let shells = match read_json::<OneOrMany>(&file)? {
                OneOrMany::Many(shells) => shells,
                OneOrMany::One(shell) => vec![*shell],
            };
            let mut ids = Vec::with_capacity(shells.len());
            for shell in shells {
                ids.push(shell.id.clone());
                registry.add_or_replace(shell)?;
            }
            json!({ "registered": ids })
        }
        Commands::Get { id } => serde_json::to_value(registry.get_shell(&id)?)?,
        Commands::List => serde_json::to_value(registry.get_all_shells()?)?,
        Commands::Remove { id } => json!({ "removed": registry.remove(&id)? }),
        Commands::Clear => json!({ "removed": registry.clear()? }),
        Commands::Submodels { shell } => serde_json::to_value(registry.get_all_submodels(&shell)?)?,
        Commands::PutSubmodel { shell, file } => {
            let submodel: SubmodelDescriptor = read_json(&file)?;
            let id = submodel.id.clone();
            registry.append_or_replace_submodel(&shell, submodel)?;
            json!({ "shell": shell, "registered": id })
        }
        Commands::RemoveSubmodel { shell, submodel } => {
            json!({ "removed": registry.remove_submodel(&shell, &submodel)? })
        }
        Commands::Search {
            path,
            value,
            regex,
            sort,
            page,
            size,
        } => {
            let mut request = match (path, value) {
                (Some(path), Some(value)) if regex => SearchRequest::regex(path, value),
                (Some(path), Some(value)) => SearchRequest::matching(path, value),
                _ => SearchRequest::all(),
            };
            for (field, direction) in sort {
                request = request.sorted_by(field, direction);
            }
            if let (Some(page), Some(size)) = (page, size) {
                request = request.with_page(page, size);
            } else if let Some(size) = size {
                request = request.with_page(0, size);
            }
            serde_json::to_value(registry.search(&request)?)?
        }
    };
    Ok(output)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Input {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// Parses `field`, `field:asc` or `field:desc`.
fn parse_sort_key(raw: &str) -> Result<(String, SortDirection), String> {
    let (field, direction) = match raw.rsplit_once(':') {
        Some((field, "asc")) => (field, SortDirection::Asc),
        Some((field, "desc")) => (field, SortDirection::Desc),
        Some((_, other)) => return Err(format!("unknown sort direction '{other}'")),
        None => (raw, SortDirection::Asc),
    };
    if field.is_empty() {
        return Err("empty sort field".to_string());
    }
    Ok((field.to_string(), direction))
}
