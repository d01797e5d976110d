//! Test-pool worker bootstrap binary.
//!
//! A pool manager that isolates workers as child processes spawns this
//! binary with a context file describing one invocation. `run`
//! bootstraps the runner and talks to the pool over stdio; `validate`
//! checks a context file without running anything.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use worker::core::locator::ModuleUrl;
use worker::exit_codes;
use worker::io::config::load_options;
use worker::io::context::read_context;
use worker::io::loader::RunnerRegistry;
use worker::{bootstrap, logging};

#[derive(Parser)]
#[command(name = "worker", version, about = "Test-pool worker bootstrap")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bootstrap one worker invocation from a context file.
    Run {
        /// Path to the pool-supplied worker context (JSON).
        #[arg(long)]
        context: PathBuf,
        /// Worker options file (TOML). Missing file means defaults.
        #[arg(long)]
        options: Option<PathBuf>,
    },
    /// Validate a context file without running it.
    Validate {
        /// Path to the pool-supplied worker context (JSON).
        #[arg(long)]
        context: PathBuf,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run { context, options } => cmd_run(&context, options.as_deref()),
        Command::Validate { context } => cmd_validate(&context),
    };
    if code != exit_codes::OK {
        std::process::exit(code);
    }
}

fn cmd_run(context: &Path, options: Option<&Path>) -> i32 {
    let ctx = match read_context(context) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("{err:#}");
            return exit_codes::INVALID;
        }
    };
    let options = match options.map(load_options).transpose() {
        Ok(options) => options.unwrap_or_default(),
        Err(err) => {
            eprintln!("{err:#}");
            return exit_codes::INVALID;
        }
    };

    let registry = RunnerRegistry::with_builtins();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            return exit_codes::FAILED;
        }
    };

    match runtime.block_on(bootstrap::run(ctx, &registry, &options)) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err}");
            exit_codes::for_error(&err)
        }
    }
}

fn cmd_validate(context: &Path) -> i32 {
    let ctx = match read_context(context) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("{err:#}");
            return exit_codes::INVALID;
        }
    };
    // The locator check runs here too so a pool can vet contexts before
    // paying for a spawn.
    if let Err(err) = ModuleUrl::normalize(&ctx.runner) {
        eprintln!("{err}");
        return exit_codes::INVALID;
    }
    println!(
        "ok: worker {} pool {} runner {}",
        ctx.worker_id, ctx.pool_id, ctx.runner
    );
    exit_codes::OK
}
