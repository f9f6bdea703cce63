//! CLI command implementations.

pub mod compile;

use chrono::Local;

/// Print a timestamped log line to stdout. Advisory only.
pub(crate) fn log_line(message: &str) {
    println!("{} {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
}
