//! Aroha CLI - operator front end for the encrypted conversation store
//!
//! The assistant links against `aroha-core` directly. This binary exposes
//! the same store operations for operators and scripts: key generation,
//! history inspection, flags, crisis resources and verification.

mod app;
mod cli;
mod commands;
mod config;
mod constants;
mod logging;
mod output;

use std::process::ExitCode;

use clap::Parser;

use crate::app::AppContext;
use crate::cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(constants::exit_codes::for_error(&err))
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let ctx = AppContext::new(cli);

    match &cli.command {
        Commands::Init => commands::init::handle_init(&ctx),
        Commands::Keygen(args) => commands::keygen::handle_keygen(&ctx, args),
        Commands::Begin { label } => commands::sessions::handle_begin(&ctx, label.as_deref()),
        Commands::Sessions { json } => commands::sessions::handle_sessions(&ctx, *json),
        Commands::History(args) => commands::sessions::handle_history(&ctx, args),
        Commands::Record(args) => commands::sessions::handle_record(&ctx, args),
        Commands::Flag { command } => commands::flags::handle_flag(&ctx, command),
        Commands::Crisis(args) => commands::crisis::handle_crisis(&ctx, args),
        Commands::Delete { session } => commands::sessions::handle_delete(&ctx, session),
        Commands::Check { json } => commands::check::handle_check(&ctx, *json),
        Commands::Completions { shell } => commands::misc::handle_completions(*shell),
    }
}
