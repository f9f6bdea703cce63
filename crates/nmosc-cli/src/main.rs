//! nmosc - compile Furnace text exports into NMOScillator ROM images.

mod cli_args;

use clap::Parser;
use std::process::ExitCode;

use nmosc_cli::commands;

fn main() -> ExitCode {
    let cli = cli_args::Cli::parse();

    let result = commands::compile::run(
        cli.input.as_deref(),
        &cli.subsong,
        cli.dump,
        cli.json,
    );

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", colored::Colorize::red("error"), e);
            ExitCode::from(2)
        }
    }
}
