//! Error and warning types for parsing and lowering.

use std::fmt;

use nmosc_nmos::FrameError;
use thiserror::Error;

/// A fatal, structural parse failure. The first one aborts the compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    /// 1-based line number the failure was detected on.
    pub line: usize,
    /// Human-readable description.
    pub message: String,
}

/// A non-fatal observation collected while parsing and surfaced at the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number the warning was raised on.
    pub line: usize,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Error raised by the channel cell grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    /// The cell is not `PPP II VV [EEEE]…` shaped.
    #[error("invalid note cell '{0}'")]
    InvalidCell(String),

    /// The 3-character pitch field is malformed.
    #[error("invalid pitch '{0}'")]
    InvalidPitch(String),

    /// The 2-character volume field is malformed.
    #[error("invalid volume '{0}'")]
    InvalidVolume(String),

    /// The 4-character effect field is malformed.
    #[error("invalid effect '{0}'")]
    InvalidEffect(String),

    /// The effect id is not one the compiler understands.
    #[error("unrecognised effect '{0}'")]
    UnknownEffect(String),
}

/// Error raised while lowering a subsong into an NMOScillator song.
#[derive(Debug, Error)]
pub enum LowerError {
    /// The requested subsong index is beyond the parsed song.
    #[error("subsong {index} does not exist; song only contains {count} subsong(s)")]
    NoSuchSubsong { index: u8, count: usize },

    /// The song carries no sound chip definition.
    #[error("song contains no sound chips")]
    NoSoundChips,

    /// No `(tempo, frame delay)` pair approximates the target tick rate
    /// within tolerance.
    #[error("unable to find a compatible tick rate within an acceptable tolerance of {target:.2} Hz")]
    TempoUnreachable { target: f64 },

    /// The 2 MHz clock divider is not supported by the NMOScillator.
    #[error("clock rate of 2 MHz is not currently supported by the NMOScillator")]
    ClockDivUnsupported,

    /// A noise-channel pitch in preset mode was not C, C# or D.
    #[error("unable to convert noise pitch {pitch} into a noise rate preset")]
    NoisePresetOutOfRange { pitch: i32 },

    /// A frame constraint was violated while building the song.
    #[error(transparent)]
    Frame(#[from] FrameError),
}
