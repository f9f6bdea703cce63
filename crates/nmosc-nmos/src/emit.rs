//! ROM serialisation for compiled songs.
//!
//! Each frame is a header byte followed by `N` command bytes. The command
//! bytes are indexed by a countdown starting at `N`: indices 2..13 are
//! forwarded verbatim to the SN76489, index 14 is a Tempo Change, and index
//! 1 is the Frame Delay byte.

use byteorder::WriteBytesExt;
use std::io::{self, Write};

use crate::error::EmitError;
use crate::frame::Frame;
use crate::song::NmosSong;

/// Header bit marking this frame as the Loop Target.
const FLAG_LOOP_TARGET: u8 = 1 << 7;
/// Header bit requesting an immediate jump back to the Loop Target.
const FLAG_LOOP_TO_TARGET: u8 = 1 << 6;

/// Countdown index of the Tempo Change byte.
const TEMPO_BYTE_INDEX: usize = 14;
/// Countdown index of the Frame Delay byte.
const DELAY_BYTE_INDEX: usize = 1;

impl NmosSong {
    /// Write the song's ROM image to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for (i, frame) in self.frames.iter().enumerate() {
            // Work on a local copy so the stored song data is never mutated.
            let mut frame = frame.clone();
            if i == 0 {
                // The data format stores the initial tempo inside the first
                // frame. When frame 0 already sets a tempo explicitly, the
                // injection fails with TempoAlreadySet and is ignored.
                let _ = frame.set_new_tempo(self.initial_tempo);
            }
            write_frame(writer, &frame, i == self.loop_target)?;
        }
        Ok(())
    }

    /// Convert the song into the ROM binary format the NMOScillator plays.
    ///
    /// The emitted length is checked against [`NmosSong::size`]; a mismatch
    /// means an emitter bug, reported as [`EmitError::SizeMismatch`].
    pub fn compile(&self) -> Result<Vec<u8>, EmitError> {
        let expected = self.size();
        let mut buffer = Vec::with_capacity(expected);
        self.write(&mut buffer)?;

        if buffer.len() != expected {
            return Err(EmitError::SizeMismatch {
                got: buffer.len(),
                expected,
            });
        }
        Ok(buffer)
    }
}

/// Write a single frame: header byte, then command bytes in countdown order.
fn write_frame<W: Write>(writer: &mut W, frame: &Frame, is_loop_target: bool) -> io::Result<()> {
    let size = frame.size();
    // Bytes following the header. Frame sizes are capped at 15 by
    // construction, so this is always 0..=14.
    let command_count = size - 1;

    let mut header = command_count as u8 & 0x0f;
    if is_loop_target {
        header |= FLAG_LOOP_TARGET;
    }
    if frame.loop_to_target {
        header |= FLAG_LOOP_TO_TARGET;
    }
    writer.write_u8(header)?;

    let mut commands = frame.commands().iter();
    // Last chip byte written, reused as filler when a tempo change pads the
    // frame beyond its real command bytes. Repeating a data byte changes
    // nothing about how the chip is running.
    let mut last_chip_byte = 0u8;

    let mut c = command_count;
    while c > 0 {
        if c == TEMPO_BYTE_INDEX {
            // Only the low 7 bits; tempo values never go higher anyway.
            writer.write_u8(frame.tempo() & 0x7f)?;
            c -= 1;
            continue;
        }
        if c == DELAY_BYTE_INDEX {
            writer.write_u8(frame.frame_delay)?;
            c -= 1;
            continue;
        }

        // Indices strictly between the delay and tempo slots hold chip
        // command bytes.
        match commands.next() {
            Some(command) => {
                let bytes = command.wire_bytes();
                writer.write_all(&bytes)?;
                if let Some(&last) = bytes.last() {
                    last_chip_byte = last;
                }
                c -= bytes.len();
            }
            None => {
                writer.write_u8(last_chip_byte)?;
                c -= 1;
            }
        }
    }

    Ok(())
}
