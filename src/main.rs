mod cli;
mod commands;
mod config;
mod engine;
mod manifest;
mod model;
mod progress;
mod resource;
mod session;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub manifest: PathBuf,
    pub state: PathBuf,
    pub api_key: Option<String>,
    pub admin_token: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        manifest: config::expand_path(&cli.manifest.to_string_lossy()),
        state: config::expand_path(&cli.state.to_string_lossy()),
        api_key: cli.api_key,
        admin_token: cli.admin_token,
    };

    match cli.command {
        Command::Plan(args) => commands::plan::run(&ctx, args),
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Destroy(args) => commands::destroy::run(&ctx, args),
        Command::Refresh => commands::refresh::run(&ctx),
        Command::Import(args) => commands::import::run(&ctx, args),
        Command::Show { address } => commands::show::run(&ctx, address.as_deref()),
        Command::List(args) => commands::list::run(&ctx, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "pinestate", &mut io::stdout());
            Ok(())
        }
    }
}
