//! opguard CLI
//!
//! Resolve sub-schemas, validate documents and mutations, and lint schema
//! registries from the command line.

use std::path::{Path as FsPath, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use opguard::{
    lint_registry, load_registry, load_schema, CollectionStatus, Path, Rejection, SchemaGuard,
    Severity, SubOp, Submission, WriteError, WriteRequest,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "opguard")]
#[command(about = "Validate document writes against per-collection JSON Schemas")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the sub-schema governing a path
    Resolve {
        /// Registry: directory of <collection>.json files, or a JSON object file/URL
        registry: String,

        /// Collection whose schema is resolved
        #[arg(long, short)]
        collection: String,

        /// Slash-separated document path (e.g. items/0/name); empty for the root
        #[arg(long, short, default_value = "")]
        path: String,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a document as a create
    Validate {
        /// Registry: directory of <collection>.json files, or a JSON object file/URL
        registry: String,

        /// Collection the document is created in
        #[arg(long, short)]
        collection: String,

        /// Document file to validate
        document: PathBuf,

        /// Document id used in error output (default: document file stem)
        #[arg(long)]
        id: Option<String>,

        /// Accept documents for collections without a schema
        #[arg(long)]
        skip_non_existing: bool,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Validate a mutation and the document it produced
    Mutate {
        /// Registry: directory of <collection>.json files, or a JSON object file/URL
        registry: String,

        /// Collection of the mutated document
        #[arg(long, short)]
        collection: String,

        /// File with the sub-ops: [{"p": [...], "oi": ...}, ...]
        #[arg(long)]
        ops: PathBuf,

        /// File with the document after every sub-op was applied
        #[arg(long)]
        result: PathBuf,

        /// Document id used in error output (default: result file stem)
        #[arg(long)]
        id: Option<String>,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Lint a schema registry (compilation, patterns, validator names)
    Lint {
        /// Registry: directory of <collection>.json files, or a JSON object file/URL
        registry: String,

        /// Validator name the host application registers (repeatable)
        #[arg(long = "known")]
        known: Vec<String>,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Resolve {
            registry,
            collection,
            path,
            pretty,
        } => run_resolve(&registry, &collection, &path, pretty),

        Commands::Validate {
            registry,
            collection,
            document,
            id,
            skip_non_existing,
            json,
        } => run_validate(&registry, &collection, &document, id, skip_non_existing, json),

        Commands::Mutate {
            registry,
            collection,
            ops,
            result,
            id,
            json,
        } => run_mutate(MutateArgs {
            registry,
            collection,
            ops,
            result,
            id,
            json_output: json,
        }),

        Commands::Lint {
            registry,
            known,
            strict,
            format,
        } => run_lint(&registry, &known, strict, &format),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("error"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the registry and build a guard with no custom validators.
fn build_guard(
    registry: &str,
    skip_non_existing: bool,
    json_output: bool,
) -> Result<SchemaGuard, u8> {
    let schemas = load_registry(registry).map_err(|e| {
        report_error(json_output, &format!("loading registry: {}", e));
        e.exit_code() as u8
    })?;

    SchemaGuard::builder(schemas)
        .skip_non_existing(skip_non_existing)
        .build()
        .map_err(|e| {
            report_error(json_output, &e.to_string());
            e.exit_code() as u8
        })
}

fn runtime() -> Result<tokio::runtime::Runtime, u8> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            eprintln!("Error: cannot start runtime: {}", e);
            2u8
        })
}

fn doc_id(explicit: Option<String>, file: &FsPath) -> String {
    explicit.unwrap_or_else(|| {
        file.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string()
    })
}

fn run_resolve(registry: &str, collection: &str, path: &str, pretty: bool) -> Result<(), u8> {
    let guard = build_guard(registry, false, false)?;

    let node = guard.resolve(collection, &Path::parse(path)).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let output = if pretty {
        serde_json::to_string_pretty(&node.raw)
    } else {
        serde_json::to_string(&node.raw)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    println!("{}", output);
    Ok(())
}

fn run_validate(
    registry: &str,
    collection: &str,
    document_path: &FsPath,
    id: Option<String>,
    skip_non_existing: bool,
    json_output: bool,
) -> Result<(), u8> {
    // Load everything before the runtime starts: remote loading blocks
    let document = load_schema(document_path).map_err(|e| {
        report_error(json_output, &format!("loading document: {}", e));
        e.exit_code() as u8
    })?;
    let guard = build_guard(registry, skip_non_existing, json_output)?;
    let doc_id = doc_id(id, document_path);

    let outcome = runtime()?.block_on(guard.submit(WriteRequest::create(
        collection,
        doc_id,
        document,
    )));

    match outcome {
        Ok(_) => report_valid(json_output),
        Err(e) => report_rejection(json_output, &e),
    }
}

struct MutateArgs {
    registry: String,
    collection: String,
    ops: PathBuf,
    result: PathBuf,
    id: Option<String>,
    json_output: bool,
}

fn run_mutate(args: MutateArgs) -> Result<(), u8> {
    let MutateArgs {
        registry,
        collection,
        ops: ops_path,
        result: result_path,
        id,
        json_output,
    } = args;

    let ops_value = load_schema(&ops_path).map_err(|e| {
        report_error(json_output, &format!("loading ops: {}", e));
        e.exit_code() as u8
    })?;
    let ops: Vec<SubOp> = serde_json::from_value(ops_value).map_err(|e| {
        report_error(json_output, &format!("invalid ops: {}", e));
        2u8
    })?;
    let applied: Value = load_schema(&result_path).map_err(|e| {
        report_error(json_output, &format!("loading result document: {}", e));
        e.exit_code() as u8
    })?;
    let guard = build_guard(&registry, false, json_output)?;
    let doc_id = doc_id(id, &result_path);

    let submitted = runtime()?.block_on(guard.submit(WriteRequest::mutate(
        collection.as_str(),
        doc_id,
        ops,
    )));

    let checked = submitted.and_then(|submission| match submission {
        Submission::Accepted => Ok(()),
        Submission::Pending(prepared) => prepared.validate_applied(&applied),
    });

    match checked {
        Ok(()) => report_valid(json_output),
        Err(e) => report_rejection(json_output, &e),
    }
}

fn report_valid(json_output: bool) -> Result<(), u8> {
    if json_output {
        println!(r#"{{"valid":true}}"#);
    } else {
        println!("Valid");
    }
    Ok(())
}

fn report_rejection(json_output: bool, err: &WriteError) -> Result<(), u8> {
    match &err.reason {
        Rejection::Invalid { failure } => {
            if json_output {
                let output = json!({
                    "valid": false,
                    "failure": failure
                });
                println!("{}", output);
            } else {
                eprintln!("Validation failed:");
                for issue in &failure.errors {
                    eprintln!("  {}", issue);
                }
            }
        }
        other => report_error(json_output, &other.to_string()),
    }
    Err(err.exit_code() as u8)
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}

fn run_lint(registry: &str, known: &[String], strict: bool, format: &str) -> Result<(), u8> {
    let schemas = load_registry(registry).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let result = lint_registry(&schemas, known, strict);

    if format == "json" {
        let output = serde_json::to_string_pretty(&result).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", output);
    } else {
        println!("Linting {} ...\n", registry);

        for collection in &result.results {
            let status_icon = match collection.status {
                CollectionStatus::Ok => "\x1b[32m✓\x1b[0m",
                CollectionStatus::Warning => "\x1b[33m⚠\x1b[0m",
                CollectionStatus::Error => "\x1b[31m✗\x1b[0m",
            };
            println!("  {} {}", status_icon, collection.collection);

            for diag in &collection.diagnostics {
                let (color, label) = match diag.severity {
                    Severity::Error => ("\x1b[31m", "error"),
                    Severity::Warning => ("\x1b[33m", "warning"),
                };
                println!(
                    "    {}{}[{}]\x1b[0m: {} - {}",
                    color, label, diag.code, diag.path, diag.message
                );
            }
        }

        println!();
        if result.is_ok() {
            println!(
                "\x1b[32m✓ {} collections checked, all passed\x1b[0m",
                result.collections_checked
            );
        } else {
            println!(
                "\x1b[31m✗ {} collections checked: {} passed, {} failed ({} errors, {} warnings)\x1b[0m",
                result.collections_checked,
                result.passed,
                result.failed,
                result.errors,
                result.warnings
            );
        }
    }

    if result.is_ok() {
        Ok(())
    } else {
        Err(1)
    }
}
