//! `stager`: stage an input directory into a run-scoped workspace, run an
//! external flow in it, and collect what the flow generated.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stager::exit_codes;
use stager::flow::CommandFlowRunner;
use stager::io::config::{AppConfig, CONFIG_ENV, locate_config};
use stager::{cli, logging};

#[derive(Parser)]
#[command(
    name = "stager",
    version,
    about = "Run-scoped workspace staging for an external flow"
)]
struct Cli {
    /// Config file (default: $STAGER_CONFIG, then config/config.toml, then config/config.example.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Prepare a workspace run, run the flow in it, and copy generated files out.
    Run {
        /// Query for the flow (overrides `runflow.query`).
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Create and seed a workspace run without running the flow.
    Prepare,
    /// Copy generated files of an existing run to the output root.
    Finalize { run_id: String },
    /// List runs under the workspace root.
    List,
    /// Remove a run's workspace and state (the output run is kept).
    Clean { run_id: String },
}

fn main() {
    logging::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // `--help`/`--version` land here too and print to stdout.
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let cwd = std::env::current_dir()?;
    let config_path = locate_config(cli.config.as_deref(), std::env::var_os(CONFIG_ENV), &cwd)?;
    let cfg = AppConfig::load(&config_path, &cwd)?;

    match cli.command {
        Command::Run { query } => {
            let flow = CommandFlowRunner::from_config(&cfg.flow);
            let stdin = std::io::stdin();
            let mut stdin = stdin.lock();
            let mut stdout = std::io::stdout();
            cli::run_command(&cfg, &flow, query, &mut stdin, &mut stdout)
        }
        Command::Prepare => cli::prepare_command(&cfg).map(|()| exit_codes::OK),
        Command::Finalize { run_id } => {
            cli::finalize_command(&cfg, &run_id).map(|()| exit_codes::OK)
        }
        Command::List => cli::list_command(&cfg).map(|()| exit_codes::OK),
        Command::Clean { run_id } => cli::clean_command(&cfg, &run_id).map(|()| exit_codes::OK),
    }
}
