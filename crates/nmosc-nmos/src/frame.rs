//! A single playback frame and its size calculation.

use crate::command::{Command, NoiseMode, NoiseRate};
use crate::error::FrameError;

/// Largest value a square channel period can hold (10-bit).
pub const MAX_SQUARE_PERIOD: u16 = (1 << 10) - 1;
/// Largest attenuation value (4-bit).
pub const MAX_ATTENUATION: u8 = (1 << 4) - 1;
/// Largest tempo register value (7-bit).
pub const MAX_TEMPO: u8 = (1 << 7) - 1;

/// Size in bytes of any frame carrying a tempo change. The tempo byte sits
/// at command index 14, so such frames are always padded to this width.
pub const TEMPO_FRAME_SIZE: usize = 15;

/// A single frame in a song.
///
/// A frame is the atomic unit of ROM data: a batch of chip commands executed
/// together, held on air for one or more Frame Clock cycles. Commands are
/// added through the `set_*` methods, which reject out-of-range values and
/// duplicate `(kind, channel)` slots.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    commands: Vec<Command>,

    /// Extra Frame Clock cycles to hold this frame.
    pub frame_delay: u8,

    has_tempo_change: bool,
    tempo: u8,

    /// Whether playback should jump back to the Loop Target at this frame.
    pub loop_to_target: bool,
}

impl Frame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// The chip commands in insertion order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Whether this frame updates the Tempo Register.
    pub fn has_tempo_change(&self) -> bool {
        self.has_tempo_change
    }

    /// The new tempo, meaningful only when [`Frame::has_tempo_change`] is true.
    pub fn tempo(&self) -> u8 {
        self.tempo
    }

    /// Make the frame change the song tempo when it is played.
    ///
    /// A frame can change the tempo at most once; a second call returns
    /// [`FrameError::TempoAlreadySet`].
    pub fn set_new_tempo(&mut self, tempo: u8) -> Result<(), FrameError> {
        if self.has_tempo_change {
            return Err(FrameError::TempoAlreadySet);
        }
        if tempo > MAX_TEMPO {
            return Err(FrameError::TempoOutOfRange(tempo));
        }

        self.tempo = tempo;
        self.has_tempo_change = true;
        Ok(())
    }

    /// Whether a command occupying the same slot already exists.
    /// Linear scan; a frame never holds more than a dozen commands.
    fn slot_taken(&self, cmd: &Command) -> bool {
        self.commands.iter().any(|existing| existing.same_slot(cmd))
    }

    /// Add a command setting the period of a square wave channel.
    ///
    /// Setting the period of the same channel twice in one frame returns
    /// [`FrameError::DuplicateSquarePeriod`].
    pub fn set_square_period(&mut self, channel: u8, period: u16) -> Result<(), FrameError> {
        if channel > 2 {
            return Err(FrameError::SquareChannelOutOfRange(channel));
        }
        if period > MAX_SQUARE_PERIOD {
            return Err(FrameError::PeriodOutOfRange(period));
        }
        let cmd = Command::SetSquarePeriod { channel, period };
        if self.slot_taken(&cmd) {
            return Err(FrameError::DuplicateSquarePeriod(channel));
        }

        self.commands.push(cmd);
        Ok(())
    }

    /// Add a command setting the attenuation of a channel (including noise).
    ///
    /// Note that attenuation is the inverse of volume: 0xf is silent and 0x0
    /// full volume. Setting the attenuation of the same channel twice in one
    /// frame returns [`FrameError::DuplicateAttenuation`].
    pub fn set_attenuation(&mut self, channel: u8, attenuation: u8) -> Result<(), FrameError> {
        if channel > 3 {
            return Err(FrameError::ChannelOutOfRange(channel));
        }
        if attenuation > MAX_ATTENUATION {
            return Err(FrameError::AttenuationOutOfRange(attenuation));
        }
        let cmd = Command::SetAttenuation {
            channel,
            attenuation,
        };
        if self.slot_taken(&cmd) {
            return Err(FrameError::DuplicateAttenuation(channel));
        }

        self.commands.push(cmd);
        Ok(())
    }

    /// Add a command configuring the noise channel.
    ///
    /// At most one noise control command per frame; a second call returns
    /// [`FrameError::DuplicateNoiseControl`].
    pub fn set_noise_control(&mut self, mode: NoiseMode, rate: NoiseRate) -> Result<(), FrameError> {
        let cmd = Command::SetNoiseControl { mode, rate };
        if self.slot_taken(&cmd) {
            return Err(FrameError::DuplicateNoiseControl);
        }

        self.commands.push(cmd);
        Ok(())
    }

    /// Size in bytes of this frame as emitted to ROM.
    pub fn size(&self) -> usize {
        if self.has_tempo_change {
            // The tempo byte must sit at command index 14, which forces the
            // frame to full width. This is the only way a 15-byte frame
            // can exist.
            return TEMPO_FRAME_SIZE;
        }

        let mut total = 1; // Frame header byte.
        for command in &self.commands {
            total += command.wire_len();
        }

        if total > 1 || self.frame_delay > 0 {
            // The frame delay byte may only be omitted when the frame has no
            // commands and no delay value: a blank frame that waits a tick.
            total += 1;
        }

        total
    }
}
