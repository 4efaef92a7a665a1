use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{error, LevelFilter};

mod cli;
use crate::cli::Cli;
use crate::cli::Commands;

mod copy;
mod engine;
mod gzip;
mod ledger;
mod record;
mod tar;

use crate::engine::EngineError;

fn main() -> ExitCode {
    // Parse the cli
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    let result = match &cli.command {
        Commands::Build { file } => build(file),
        Commands::Restore { file } => engine::restore(file).map(|_| ()),
        Commands::Fix { basename } => engine::fix(basename).map(|_| ()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // A failed run never leaves a complete-looking output set
            // behind. Input/output precondition failures happen before
            // anything is written, deleting would hit user files.
            if !matches!(
                e,
                EngineError::OutputExists(_) | EngineError::InputMissing(_)
            ) {
                cleanup(&cli.command);
            }
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn build(file: &Path) -> Result<(), EngineError> {
    let stats = engine::build(file)?;
    if stats.members == 0 {
        log::warn!("{} held no members at all", file.display());
    }
    Ok(())
}

fn cleanup(command: &Commands) {
    let partial: Vec<PathBuf> = match command {
        Commands::Build { file } => engine::MegawarcSet::for_basename(file)
            .paths()
            .map(Path::to_path_buf)
            .to_vec(),
        Commands::Restore { file } => vec![file.clone()],
        Commands::Fix { basename } => {
            engine::MegawarcSet::for_basename(&engine::fixed_basename(basename))
                .paths()
                .map(Path::to_path_buf)
                .to_vec()
        }
    };

    for path in partial {
        let _ = fs::remove_file(path);
    }
}
