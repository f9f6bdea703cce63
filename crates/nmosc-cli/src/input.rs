//! Input path selection and validation.
//!
//! The input file comes either from the command line or, when no argument
//! was given, from a native file-open dialog started in the current working
//! directory.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Outcome of choosing an input file.
#[derive(Debug)]
pub enum InputChoice {
    /// A validated, absolute path to the export file.
    Path(PathBuf),
    /// The user dismissed the file dialog.
    Cancelled,
}

/// Resolve the input file path from the argument or an interactive dialog.
pub fn choose_input(arg: Option<&Path>) -> Result<InputChoice> {
    if let Some(path) = arg {
        let path = std::path::absolute(path).context("cannot get absolute path")?;
        validate_path(&path).context("passed argument is not a valid path")?;
        return Ok(InputChoice::Path(path));
    }

    let cwd = env::current_dir().context("failed to get current working directory")?;
    let Some(path) = rfd::FileDialog::new()
        .set_title("Open Furnace text export")
        .add_filter("Furnace text exports (*.txt)", &["txt"])
        .set_directory(&cwd)
        .pick_file()
    else {
        return Ok(InputChoice::Cancelled);
    };

    let path = std::path::absolute(&path).context("cannot get absolute path")?;
    validate_path(&path).context("dialog selection invalid")?;
    Ok(InputChoice::Path(path))
}

/// Simple checks that the path points at an existing `.txt` file.
pub fn validate_path(path: &Path) -> Result<()> {
    let has_txt_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false);
    if !has_txt_extension {
        bail!("file must have .txt extension");
    }
    std::fs::metadata(path)
        .with_context(|| format!("cannot stat file {}", path.display()))?;
    Ok(())
}
