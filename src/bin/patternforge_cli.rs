//! PatternForge CLI - Bridge interface for the API layer
//!
//! Commands: families, operations, validate, apply, show
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 when rules are rejected

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

use patternforge_core::{
    load_family, BlockFamily, DirectoryPatternSource, OperationTable, PatternSource, Piece, PieceMap,
    Pipeline, RawRule, SchemaRegistry,
};

#[derive(Parser)]
#[command(name = "patternforge-cli")]
#[command(about = "PatternForge CLI - Pattern Adjustment Compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root of the base pattern library (<family>/<piece>.svg)
    #[arg(short, long, default_value = "patterns")]
    patterns_dir: PathBuf,

    /// Schema table override (JSON)
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Operation range table override (JSON)
    #[arg(long)]
    operations: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List block families and their landmark placement
    Families,

    /// List the operation vocabulary with safe ranges
    Operations,

    /// Validate and compile rules without touching any pattern
    Validate {
        #[arg(short, long)]
        family: BlockFamily,

        /// JSON array of { operation, valueCm }
        #[arg(short, long)]
        rules: String,
    },

    /// Apply rules to a family's base pieces
    Apply {
        #[arg(short, long)]
        family: BlockFamily,

        /// JSON array of { operation, valueCm }
        #[arg(short, long)]
        rules: String,

        /// Write <piece>.svg files here
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// Print a base piece unchanged
    Show {
        #[arg(short, long)]
        family: BlockFamily,

        #[arg(long)]
        piece: Piece,
    },
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => println!(r#"{{"success": false, "error": "{}"}}"#, e),
    }
}

fn build_pipeline(cli: &Cli) -> Result<Pipeline, String> {
    let registry = match &cli.schema {
        Some(path) => SchemaRegistry::load_from_path(path).map_err(|e| e.to_string())?,
        None => SchemaRegistry::builtin(),
    };
    let table = match &cli.operations {
        Some(path) => OperationTable::load_from_path(path).map_err(|e| e.to_string())?,
        None => OperationTable::builtin(),
    };
    Ok(Pipeline::new(registry, table))
}

fn parse_rules(payload: &str) -> Result<Vec<RawRule>, ExitCode> {
    serde_json::from_str(payload).map_err(|e| {
        print_json(&serde_json::json!({
            "success": false,
            "error": format!("Invalid rules payload: {}", e),
        }));
        ExitCode::FAILURE
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let pipeline = match build_pipeline(&cli) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "failed to load tables");
            print_json(&serde_json::json!({ "success": false, "error": e }));
            return ExitCode::FAILURE;
        }
    };
    let source = DirectoryPatternSource::new(&cli.patterns_dir);

    match &cli.command {
        Commands::Families => {
            let families: Vec<_> = pipeline
                .registry()
                .list()
                .iter()
                .map(|schema| {
                    serde_json::json!({
                        "family": schema.family,
                        "schemaVersion": pipeline.registry().version(),
                        "unitScale": schema.unit_scale,
                        "landmarks": schema.landmarks,
                    })
                })
                .collect();
            print_json(&families);
            ExitCode::SUCCESS
        }

        Commands::Operations => {
            let operations: Vec<_> = pipeline
                .operations()
                .iter()
                .map(|(op, range)| {
                    serde_json::json!({
                        "operation": op,
                        "kind": op.kind(),
                        "landmark": op.target(),
                        "minCm": range.min_cm,
                        "maxCm": range.max_cm,
                    })
                })
                .collect();
            print_json(&operations);
            ExitCode::SUCCESS
        }

        Commands::Validate { family, rules } => {
            let rules = match parse_rules(rules) {
                Ok(r) => r,
                Err(code) => return code,
            };
            match pipeline.compile_rules(*family, &rules) {
                Ok(descriptors) => {
                    print_json(&serde_json::json!({
                        "valid": true,
                        "descriptors": descriptors,
                    }));
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    print_json(&serde_json::json!({
                        "valid": false,
                        "error": e.envelope(),
                    }));
                    ExitCode::from(2)
                }
            }
        }

        Commands::Apply { family, rules, out_dir } => {
            let rules = match parse_rules(rules) {
                Ok(r) => r,
                Err(code) => return code,
            };
            let base = match load_family(&source, *family) {
                Ok(b) => b,
                Err(e) => {
                    print_json(&serde_json::json!({ "success": false, "error": e.to_string() }));
                    return ExitCode::FAILURE;
                }
            };

            match pipeline.apply_rules(*family, &base, &rules) {
                Ok(applied) => {
                    if let Some(dir) = out_dir {
                        if let Err(e) = write_outputs(dir, &applied.documents) {
                            print_json(&serde_json::json!({ "success": false, "error": e.to_string() }));
                            return ExitCode::FAILURE;
                        }
                    }
                    print_json(&serde_json::json!({
                        "success": true,
                        "family": applied.family,
                        "digests": applied.digests,
                        "jobHash": applied.job_hash,
                    }));
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    print_json(&serde_json::json!({
                        "success": false,
                        "error": e.envelope(),
                    }));
                    ExitCode::from(2)
                }
            }
        }

        Commands::Show { family, piece } => match source.load(*family, *piece) {
            Ok(text) => {
                print!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                print_json(&serde_json::json!({ "success": false, "error": e.to_string() }));
                ExitCode::FAILURE
            }
        },
    }
}

fn write_outputs(dir: &Path, documents: &PieceMap<String>) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    for (piece, text) in documents {
        fs::write(dir.join(format!("{}.svg", piece.as_str())), text)?;
    }
    Ok(())
}
