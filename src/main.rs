use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod assemble;
mod catalog;
mod cli;
mod commands;
mod config;
mod error;
mod lighting;
mod lm;
mod process;
mod render;
mod scene;
mod stages;
mod util;
mod workflow;

use cli::{Command, RootArgs};

fn main() -> Result<ExitCode> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match &args.command {
        Command::Generate(generate) => {
            workflow::install_interrupt_handler()?;
            if commands::run_generate(generate)? {
                return Ok(ExitCode::SUCCESS);
            }
            return Ok(ExitCode::FAILURE);
        }
        Command::Init(init) => {
            let path = commands::run_init(init)?;
            eprintln!("wrote {}", path.display());
        }
        Command::Select(select) => commands::run_select(select)?,
        Command::Blend(blend) => commands::run_blend(blend)?,
        Command::Search(search) => commands::run_search(search)?,
        Command::Status(status) => commands::run_status(status)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Logs go to stderr so stdout stays clean for script and JSON output.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
