use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use starling_core::{EvalError, FileOptions, StringDict, vm::encode_program};
use tracing::info;

mod loader;
mod repl;

use loader::{COMPILED_EXTENSION, ModuleLoader, load_program, stdout_thread};

const DEFAULT_TRACE_FILTER: &str = "starling_core=warn,starling_cli=info";

#[derive(Debug, Parser)]
#[command(name = "starling", author, version, about = "CLI for Starling", long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Source (or compiled `.slb`) file to execute. Starts the REPL when omitted.
    #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
    file: Option<PathBuf>,

    #[command(flatten)]
    options: OptionArgs,
}

#[derive(Debug, Default, clap::Args)]
struct OptionArgs {
    /// TOML file with dialect options (allow_recursion, allow_global_reassign, ...)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Abort execution after this many VM steps
    #[arg(long, value_name = "N", global = true)]
    max_steps: Option<u64>,

    /// Allow recursive function calls
    #[arg(long, global = true)]
    recursion: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start an interactive session.
    Repl,
    /// Print the bytecode of every function in a file.
    Disasm {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
    },
    /// Compile a source file into an encoded program.
    Compile {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
        /// Output path; defaults to FILE with the `.slb` extension
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
    },
}

pub(crate) fn sanitize_path(raw: &str) -> Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            bail!("Parent directory components ('..') are not allowed in file paths.");
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn env_toggle(name: &str) -> bool {
    std::env::var(name).is_ok_and(|raw| env_toggle_enabled(&raw))
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_TRACE_FILTER));
    let _ = fmt().with_writer(std::io::stderr).with_env_filter(filter).try_init();
}

/// Options from `--config`, then environment toggles, then flags.
fn resolve_options(args: &OptionArgs) -> Result<FileOptions> {
    let mut options = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config '{}'", path.display()))?;
            toml::from_str::<FileOptions>(&text)
                .with_context(|| format!("Invalid config '{}'", path.display()))?
        }
        None => FileOptions::default(),
    };
    if env_toggle("STARLING_RECURSION") {
        options.allow_recursion = true;
    }
    if env_toggle("STARLING_GLOBALREASSIGN") {
        options.allow_global_reassign = true;
    }
    if args.recursion {
        options.allow_recursion = true;
    }
    if let Some(n) = args.max_steps {
        options.max_steps = n;
    }
    Ok(options)
}

fn run_file(path: &Path, options: FileOptions) -> Result<()> {
    let program = Arc::new(load_program(path, options)?);
    let mut thread = stdout_thread(options).with_name("main");
    ModuleLoader::new(path.parent(), options).install(&mut thread);
    let (_, result) = program.init(&mut thread, StringDict::new());
    result
}

fn disasm(path: &Path, options: FileOptions) -> Result<()> {
    let program = load_program(path, options)?;
    print!("{}", program.disassemble());
    Ok(())
}

fn compile(path: &Path, output: Option<PathBuf>, options: FileOptions) -> Result<()> {
    let program = load_program(path, options)?;
    let out_path = output.unwrap_or_else(|| path.with_extension(COMPILED_EXTENSION));
    let bytes = encode_program(&program)?;
    if let Some(parent) = out_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory for {}", out_path.display()))?;
    }
    std::fs::write(&out_path, &bytes)
        .with_context(|| format!("Failed to write bytecode to {}", out_path.display()))?;
    info!(path = %out_path.display(), bytes = bytes.len(), "emitted bytecode");
    Ok(())
}

fn run(args: CliArgs) -> Result<()> {
    let options = resolve_options(&args.options)?;
    match (args.command, args.file) {
        (Some(Commands::Repl), _) | (None, None) => repl::run(options),
        (Some(Commands::Disasm { file }), _) => disasm(&file, options),
        (Some(Commands::Compile { file, output }), _) => compile(&file, output, options),
        (None, Some(file)) => run_file(&file, options),
    }
}

/// Evaluation errors print their Starling backtrace; anything else its
/// context chain.
pub(crate) fn report(err: &anyhow::Error) -> String {
    match err.downcast_ref::<EvalError>() {
        Some(eval) => eval.backtrace(),
        None => format!("Error: {err:#}"),
    }
}

fn main() {
    init_tracing();
    let args = CliArgs::parse();
    if let Err(err) = run(args) {
        eprintln!("{}", report(&err));
        std::process::exit(1);
    }
}
