//! Error types for the song model and emitter.

use thiserror::Error;

/// Error raised by the frame-mutation operations.
///
/// A frame accepts at most one command per `(command kind, channel)`
/// combination and at most one tempo change; all values are range-checked
/// before they are stored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The frame already carries a tempo change.
    #[error("frame already has a tempo change")]
    TempoAlreadySet,

    /// Tempo register values are 7-bit.
    #[error("tempo must be 0-127, got {0}")]
    TempoOutOfRange(u8),

    /// Square period commands only exist for the three square channels.
    #[error("square channel must be 0-2, got {0}")]
    SquareChannelOutOfRange(u8),

    /// Square periods are 10-bit.
    #[error("square period must be 0-1023, got {0}")]
    PeriodOutOfRange(u16),

    /// Attenuation applies to all four channels.
    #[error("channel must be 0-3, got {0}")]
    ChannelOutOfRange(u8),

    /// Attenuation values are 4-bit.
    #[error("attenuation must be 0-15, got {0}")]
    AttenuationOutOfRange(u8),

    /// A period was already set for this channel in this frame.
    #[error("square period already set for channel {0} in this frame")]
    DuplicateSquarePeriod(u8),

    /// An attenuation was already set for this channel in this frame.
    #[error("attenuation already set for channel {0} in this frame")]
    DuplicateAttenuation(u8),

    /// The noise control was already set in this frame.
    #[error("noise control already set in this frame")]
    DuplicateNoiseControl,
}

/// Error raised while emitting a song to ROM bytes.
#[derive(Debug, Error)]
pub enum EmitError {
    /// The emitted buffer does not match the precomputed song size.
    /// This is an internal invariant violation, not a data error.
    #[error("ROM image size mismatch: got {got} bytes, expected {expected}")]
    SizeMismatch { got: usize, expected: usize },

    /// I/O error from the underlying writer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
