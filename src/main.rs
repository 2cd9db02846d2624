//! motionflash - Configure, persist and bench-test motor controllers
//!
//! A command-line front end for packet-serial motor controllers. It reads
//! firmware and telemetry, dumps and flashes configuration documents with
//! optional read-back verification, and runs safety-gated test recipes.
//!
//! # Architecture
//!
//! All device work happens in `motionflash-core` through a `Session`, which
//! owns the transport chosen with `--backend`:
//! - **serial** - a controller on a serial port
//! - **dummy** - an in-memory emulator, for trying workflows without hardware
//!
//! Each command maps its outcome onto a distinct exit code; failures are also
//! printed as a JSON object on stderr. `flash` and `test` always leave a
//! report artifact behind, even when they fail.

mod backends;
mod cli;
mod commands;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Commands};
use commands::{CliError, Context};
use motionflash_core::{FlashOptions, RecipeBook, TransportTuning};

fn main() -> ExitCode {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::debug!("Command failed: {}", e);
            eprintln!("{}", e.to_json());
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let tuning = TransportTuning::from_env()?;
    if tuning.verbose && cli.verbose == 0 {
        log::set_max_level(log::LevelFilter::Trace);
    }

    let recipes = load_recipe_book(cli.recipes.as_deref())?;
    log::debug!("Loaded {} recipe(s)", recipes.len());

    let ctx = Context {
        backend: cli.backend,
        tuning,
        recipes,
    };

    match cli.command {
        Commands::List => commands::list_ports(),
        Commands::Info { target } => {
            commands::cmd_info(&ctx, &commands::resolve_target(&target)?)
        }
        Commands::Status { target, fields } => {
            commands::cmd_status(&ctx, &commands::resolve_target(&target)?, &fields)
        }
        Commands::Dump { target, out } => {
            commands::cmd_dump(&ctx, &commands::resolve_target(&target)?, &out)
        }
        Commands::Flash {
            target,
            config,
            verify,
            strict,
            report_dir,
        } => {
            let target = commands::resolve_target(&target)?;
            let options = if strict {
                FlashOptions::strict()
            } else if verify {
                FlashOptions::verified()
            } else {
                FlashOptions::unverified()
            };
            commands::cmd_flash(&ctx, &target, &config, options, &report_dir)
        }
        Commands::Test {
            target,
            recipe,
            csv,
            report_dir,
        } => {
            let target = commands::resolve_target(&target)?;
            commands::cmd_test(&ctx, &target, &recipe, csv, &report_dir)
        }
        Commands::ListBackends => {
            commands::list_backends();
            Ok(())
        }
        Commands::ListRecipes => {
            commands::list_recipes(&ctx.recipes);
            Ok(())
        }
    }
}

/// Built-in recipes plus those at `path`, if given
fn load_recipe_book(path: Option<&Path>) -> Result<RecipeBook, CliError> {
    let mut book = RecipeBook::builtin();

    if let Some(path) = path {
        if !path.exists() {
            return Err(motionflash_core::Error::invalid(format!(
                "recipe path not found: {}",
                path.display()
            ))
            .into());
        }
        let count = book
            .load_path(path)
            .map_err(motionflash_core::Error::from)?;
        log::info!("Loaded {} recipe(s) from {}", count, path.display());
    }

    Ok(book)
}
