//! The compile command: Furnace text export in, `.bin` ROM image out.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;

use nmosc_furnace::{lower_subsong, parse};

use super::log_line;
use crate::input::{choose_input, InputChoice};
use crate::report::{CompileReport, SubsongReport, WarningReport};

/// Compile the requested subsongs of an export into a single `.bin` file
/// written next to the input.
///
/// When `subsongs` is empty every subsong in the file is compiled, in
/// order. The output file is only written after all of them succeeded.
pub fn run(input: Option<&Path>, subsongs: &[u8], dump: bool, json: bool) -> Result<ExitCode> {
    let path = match choose_input(input)? {
        InputChoice::Path(path) => path,
        InputChoice::Cancelled => {
            log_line("User cancelled the file dialog");
            return Ok(ExitCode::from(1));
        }
    };

    if !json {
        log_line(&format!("Compiling {}", path.display()));
    }

    let file = File::open(&path).with_context(|| format!("error opening {}", path.display()))?;
    let outcome = parse(BufReader::new(file)).context("parse error")?;

    if !json && !outcome.warnings.is_empty() {
        log_line("Warnings produced while parsing file:");
        for warning in &outcome.warnings {
            println!("  {}", warning.to_string().yellow());
        }
    }

    let indices: Vec<u8> = if subsongs.is_empty() {
        if !json {
            log_line(&format!(
                "Concatenating {} subsongs",
                outcome.song.subsongs.len()
            ));
        }
        (0..outcome.song.subsongs.len())
            .map(|i| u8::try_from(i).context("song contains more subsongs than can be addressed"))
            .collect::<Result<_>>()?
    } else {
        subsongs.to_vec()
    };

    let mut rom = Vec::new();
    let mut compiled = Vec::new();
    for &index in &indices {
        let song = lower_subsong(&outcome.song, index)
            .with_context(|| format!("error parsing subsong {index}"))?;
        let bin = song
            .compile()
            .with_context(|| format!("error compiling subsong {index}"))?;

        if !json {
            log_line(&format!(
                "Subsong {}:\taddress: {},\tsize: {} bytes",
                index,
                rom.len(),
                bin.len()
            ));
            if dump {
                print!("{song}");
            }
        }

        compiled.push(SubsongReport {
            index,
            name: song.name.clone(),
            address: rom.len(),
            size: bin.len(),
        });
        rom.extend_from_slice(&bin);
    }

    if !json {
        log_line(&format!("Total rom size: {} bytes", rom.len()));
    }

    // Written next to the source file, and only after every requested
    // subsong compiled.
    let bin_path = path.with_extension("bin");
    fs::write(&bin_path, &rom)
        .with_context(|| format!("error writing output file {}", bin_path.display()))?;
    if !json {
        log_line(&format!("Wrote {}", bin_path.display()));
    }

    if json {
        let report = CompileReport {
            input: path.display().to_string(),
            output: bin_path.display().to_string(),
            subsongs: compiled,
            total_size: rom.len(),
            warnings: outcome.warnings.iter().map(WarningReport::from).collect(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("error serialising report")?
        );
    }

    Ok(ExitCode::SUCCESS)
}
