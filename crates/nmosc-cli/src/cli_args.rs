//! CLI argument definitions for the `nmosc` compiler.
//!
//! The `#[derive(Parser)]` type is defined here, keeping `main.rs` focused
//! on dispatch.

use clap::Parser;
use std::path::PathBuf;

/// nmosc - Furnace text export to NMOScillator ROM compiler
#[derive(Parser)]
#[command(name = "nmosc")]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Path to the Furnace text export (.txt). Opens a file dialog when
    /// omitted.
    pub input: Option<PathBuf>,

    /// Subsong index to compile (repeatable; all subsongs when omitted)
    #[arg(short = 's', long = "subsong", value_parser = clap::value_parser!(u8).range(0..=127))]
    pub subsong: Vec<u8>,

    /// Print the compiled frame listing for each subsong
    #[arg(long)]
    pub dump: bool,

    /// Output a machine-readable JSON compile report (no colored output)
    #[arg(long)]
    pub json: bool,
}
