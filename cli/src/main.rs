mod config;
mod test_runner;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

use devins::BlockParser;
use devins_compiler::{CancelSignal, Compiler, Diagnostic};

use crate::config::{Config, DEFAULT_CONFIG_FILE};

#[derive(Parser)]
#[command(name = "devins", version, about = "DevIns block scanner and command compiler")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the blocks a model reply segments into
    Blocks(BlocksArgs),

    /// Compile the commands in a model reply
    Compile(CompileArgs),

    /// Run .test.md fixtures
    Test(TestArgs),
}

#[derive(clap::Args)]
struct BlocksArgs {
    /// Model reply to segment
    file: PathBuf,

    /// Dump the blocks in debug form
    #[arg(long)]
    debug: bool,
}

#[derive(clap::Args)]
struct CompileArgs {
    /// Model reply to compile
    file: PathBuf,

    /// Config file (defaults to devins.toml next to the input, if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Don't print the compiled output (just check for errors)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.md file or directory containing them
    path: PathBuf,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG=debug shows scanner and compiler decisions
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Blocks(args) => do_blocks(args),
        Command::Compile(args) => {
            let exit_code = do_compile(args, cli.no_color).await?;
            process::exit(exit_code);
        }
        Command::Test(args) => {
            if args.list_categories {
                test_runner::list_categories(&args.path);
                return Ok(());
            }
            let exit_code = test_runner::run_tests(&args.path, cli.no_color, &args.category).await;
            process::exit(exit_code);
        }
    }
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read '{}'", path.display()))
}

fn do_blocks(args: BlocksArgs) -> Result<()> {
    let source = read_source(&args.file)?;
    let blocks = devins::parse_all(&source);

    if args.debug {
        println!("{:#?}", blocks);
        return Ok(());
    }

    for (index, block) in blocks.iter().enumerate() {
        let state = if block.is_complete() { "" } else { ", incomplete" };
        match block.extension() {
            Some(ext) => println!(
                "#{} {} ({} .{}{})",
                index,
                block.kind_name(),
                block.language_id(),
                ext,
                state
            ),
            None => println!("#{} {} ({}{})", index, block.kind_name(), block.language_id(), state),
        }
        for line in block.text().lines() {
            println!("    {}", line);
        }
    }
    Ok(())
}

/// Compile one reply. Returns the exit code: 1 when the reply has hard errors.
async fn do_compile(args: CompileArgs, no_color: bool) -> Result<i32> {
    let source = read_source(&args.file)?;

    let input_dir = args
        .file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| input_dir.join(DEFAULT_CONFIG_FILE));
    let config = match Config::load_from_path(&config_path)? {
        Some(config) => config,
        None if args.config.is_some() => {
            anyhow::bail!("config file not found: {}", config_path.display())
        }
        None => Config::default(),
    };
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or(input_dir);

    let registries = config.registries(&base_dir)?;
    let compiler = Compiler::new(registries).with_options(config.options());

    let (handle, signal) = CancelSignal::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let result = compiler.compile_with_cancel(&source, signal).await;

    if !args.quiet {
        println!("{}", result.output);
    }

    // spans index the reply after legacy fence repair
    let repaired = BlockParser::new().segment(&source).source;
    let mut files = SimpleFiles::new();
    let file_id = files.add(args.file.display().to_string(), repaired);
    emit_diagnostics(&files, file_id, &result.diagnostics, no_color);

    if let Some(agent) = &result.delegate_agent {
        eprintln!("delegated to agent: {}", agent.name);
    }
    if result.cancelled {
        eprintln!("compilation cancelled");
    }

    Ok(if result.has_error { 1 } else { 0 })
}

fn emit_diagnostics(
    files: &SimpleFiles<String, String>,
    file_id: usize,
    diagnostics: &[Diagnostic],
    no_color: bool,
) {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    let writer = StandardStream::stderr(color_choice);
    let config = term::Config::default();

    for diagnostic in diagnostics {
        let report = diagnostic.to_diagnostic(file_id);
        if term::emit_to_write_style(&mut writer.lock(), &config, files, &report).is_err() {
            eprintln!("{}: {}", if diagnostic.is_warning() { "warning" } else { "error" }, diagnostic);
        }
    }
}
