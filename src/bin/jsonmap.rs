//! jsonmap CLI
//!
//! Command-line interface for compiling mapping schemas and transforming documents.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use jsonmap::{
    compile_document, load_document_auto, load_schema, transform, whitespace_split, Decomposers,
    Error, ErrorMode, KeyMapOutput, ResolveOptions, TransformError, TransformOptions,
};

#[derive(Parser)]
#[command(name = "jsonmap")]
#[command(about = "Compile JSON mapping schemas and transform documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform an input document with a mapping schema
    Transform {
        /// Mapping schema file
        schema: PathBuf,

        /// Input document file (`-` for stdin)
        input: String,

        /// Fail on missing required fields and failed coercions
        #[arg(long)]
        strict: bool,

        /// Report every failing field instead of stopping at the first
        #[arg(long)]
        collect_errors: bool,

        /// Emit KEY_MAP fields as objects keyed by the original keys
        #[arg(long)]
        keyed: bool,

        /// Split undivided values of this semantic type on whitespace (repeatable)
        #[arg(long, value_name = "TYPE")]
        decompose: Vec<String>,

        /// Represent recursive definitions instead of rejecting them
        #[arg(long)]
        allow_recursion: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the compiled rules of a mapping schema
    Compile {
        /// Mapping schema file
        schema: PathBuf,

        /// Represent recursive definitions instead of rejecting them
        #[arg(long)]
        allow_recursion: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Parse, resolve and compile schema files without transforming anything
    Check {
        /// Schema files to check
        #[arg(required = true)]
        schemas: Vec<PathBuf>,

        /// Represent recursive definitions instead of rejecting them
        #[arg(long)]
        allow_recursion: bool,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Transform {
            schema,
            input,
            strict,
            collect_errors,
            keyed,
            decompose,
            allow_recursion,
            output,
            pretty,
        } => run_transform(TransformArgs {
            schema,
            input,
            strict,
            collect_errors,
            keyed,
            decompose,
            allow_recursion,
            output,
            pretty,
        }),

        Commands::Compile {
            schema,
            allow_recursion,
            pretty,
        } => run_compile(&schema, allow_recursion, pretty),

        Commands::Check {
            schemas,
            allow_recursion,
        } => run_check(&schemas, allow_recursion),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

struct TransformArgs {
    schema: PathBuf,
    input: String,
    strict: bool,
    collect_errors: bool,
    keyed: bool,
    decompose: Vec<String>,
    allow_recursion: bool,
    output: Option<PathBuf>,
    pretty: bool,
}

fn run_transform(args: TransformArgs) -> Result<(), u8> {
    let resolve_options = ResolveOptions::new().allow_recursion(args.allow_recursion);
    let compiled = load_and_compile(&args.schema, &resolve_options).map_err(fail)?;
    let input = load_document_auto(&args.input).map_err(fail)?;

    let mut decomposers = Decomposers::with_builtins();
    for semantic_type in &args.decompose {
        decomposers.register(semantic_type.clone(), whitespace_split);
    }

    let options = TransformOptions::new()
        .strict(args.strict)
        .error_mode(if args.collect_errors {
            ErrorMode::CollectAll
        } else {
            ErrorMode::FailFast
        })
        .key_map_output(if args.keyed {
            KeyMapOutput::Keyed
        } else {
            KeyMapOutput::Elements
        })
        .decomposers(decomposers);

    let output = match transform(&compiled, &input, &options) {
        Ok(output) => output,
        Err(err) => {
            report_transform_errors(err);
            return Err(1);
        }
    };

    write_json(&output, args.pretty, args.output.as_deref())
}

fn run_compile(schema: &Path, allow_recursion: bool, pretty: bool) -> Result<(), u8> {
    let options = ResolveOptions::new().allow_recursion(allow_recursion);
    let compiled = load_and_compile(schema, &options).map_err(fail)?;
    write_json(&compiled, pretty, None)
}

fn run_check(schemas: &[PathBuf], allow_recursion: bool) -> Result<(), u8> {
    let options = ResolveOptions::new().allow_recursion(allow_recursion);
    let mut worst = 0u8;

    for path in schemas {
        match load_and_compile(path, &options) {
            Ok(compiled) => {
                println!("ok: {} ({} rules)", path.display(), compiled.rules().len());
            }
            Err(e) => {
                eprintln!("error: {}: {}", path.display(), e);
                worst = worst.max(e.exit_code() as u8);
            }
        }
    }

    if worst == 0 {
        Ok(())
    } else {
        Err(worst)
    }
}

fn load_and_compile(path: &Path, options: &ResolveOptions) -> Result<jsonmap::CompiledSchema, Error> {
    let doc = load_schema(path)?;
    compile_document(&doc, options)
}

fn fail(e: Error) -> u8 {
    eprintln!("Error: {}", e);
    e.exit_code() as u8
}

fn report_transform_errors(err: TransformError) {
    let errors = err.into_errors();
    if errors.len() == 1 {
        eprintln!("Error: {}", errors[0]);
        return;
    }
    eprintln!("Transformation failed with {} errors:", errors.len());
    for error in errors {
        eprintln!("  {}", error);
    }
}

fn write_json<T: Serialize>(value: &T, pretty: bool, output: Option<&Path>) -> Result<(), u8> {
    let json_output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}
