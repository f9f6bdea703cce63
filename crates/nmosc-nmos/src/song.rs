//! The song-level aggregate and its human-readable listing.

use std::fmt;

use crate::frame::{Frame, TEMPO_FRAME_SIZE};

/// A single song composition. Multiple of these can be concatenated onto a
/// single ROM, if desired.
#[derive(Debug, Clone, Default)]
pub struct NmosSong {
    /// Name of the song.
    pub name: String,
    /// Author of the song.
    pub author: String,

    /// Initial tempo of the song (7-bit).
    pub initial_tempo: u8,
    /// If true, the base clock fed into the chip is divided by 2, running it
    /// at half speed and lowering all notes by an octave.
    pub clock_div: bool,

    /// The frames of the song, in playback order.
    pub frames: Vec<Frame>,
    /// The index of the frame marked as the Loop Target.
    pub loop_target: usize,
}

impl NmosSong {
    /// Total size in bytes of the song as emitted to ROM.
    pub fn size(&self) -> usize {
        let mut size = 0;
        for (i, frame) in self.frames.iter().enumerate() {
            let mut frame_size = frame.size();
            if i == 0 && !frame.has_tempo_change() {
                // The first frame carries the injected initial tempo during
                // emission, so it always sits at full tempo-frame width.
                frame_size = TEMPO_FRAME_SIZE;
            }
            size += frame_size;
        }
        size
    }
}

/// Channel column headers for the frame listing.
const CHANNEL_HEADERS: [&str; 4] = ["Square 1", "Square 2", "Square 3", "Noise"];

/// Minimum column width in the frame listing.
const MIN_COLUMN_WIDTH: usize = 18;

/// Format a frame's commands as a four-column channel table.
fn format_commands_by_channel(frame: &Frame, indent: usize) -> String {
    let num_channels = CHANNEL_HEADERS.len();

    // Group command strings by channel.
    let mut cols: Vec<Vec<String>> = vec![Vec::new(); num_channels];
    for command in frame.commands() {
        let channel = command.channel() as usize;
        if channel < num_channels {
            cols[channel].push(command.to_string());
        }
    }

    let max_rows = cols.iter().map(Vec::len).max().unwrap_or(0);

    let widths: Vec<usize> = (0..num_channels)
        .map(|i| {
            cols[i]
                .iter()
                .map(String::len)
                .chain(std::iter::once(CHANNEL_HEADERS[i].len()))
                .max()
                .unwrap_or(0)
                .max(MIN_COLUMN_WIDTH)
        })
        .collect();

    let pad = " ".repeat(indent);
    let separator: String = {
        let mut s = pad.clone();
        for &width in &widths {
            s.push('+');
            s.push_str(&"-".repeat(width + 2));
        }
        s.push_str("+\n");
        s
    };

    let mut out = String::new();
    out.push_str(&separator);

    out.push_str(&pad);
    for (i, &width) in widths.iter().enumerate() {
        out.push_str(&format!("| {:<width$} ", CHANNEL_HEADERS[i]));
    }
    out.push_str("|\n");
    out.push_str(&separator);

    for row in 0..max_rows {
        out.push_str(&pad);
        for (channel, &width) in widths.iter().enumerate() {
            let cell = cols[channel].get(row).map(String::as_str).unwrap_or("");
            out.push_str(&format!("| {cell:<width$} "));
        }
        out.push_str("|\n");
    }

    out.push_str(&separator);
    out
}

impl fmt::Display for NmosSong {
    /// Renders the full frame listing: per-frame command tables, tempo
    /// changes, delays, loop markers and byte sizes. Advisory output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "NMOScillator Song:")?;
        writeln!(f, "- Name: {}", self.name)?;
        writeln!(f, "- Author: {}", self.author)?;
        writeln!(f, "- Initial tempo: {}", self.initial_tempo)?;
        writeln!(
            f,
            "- Clock rate: {}",
            if self.clock_div { "2 MHz" } else { "4 MHz" }
        )?;
        writeln!(f, "- Frames:")?;

        for (i, frame) in self.frames.iter().enumerate() {
            write!(f, "\n  - Frame #{}:", i)?;
            if self.loop_target == i {
                write!(f, " (loop target)")?;
            }
            writeln!(f)?;

            // Show the first frame as it will be emitted, with the initial
            // tempo injected. The stored song data is left untouched.
            let mut frame = frame.clone();
            if i == 0 {
                let _ = frame.set_new_tempo(self.initial_tempo);
            }

            if !frame.commands().is_empty() {
                f.write_str(&format_commands_by_channel(&frame, 6))?;
            }

            if frame.has_tempo_change() {
                writeln!(
                    f,
                    "    - Change tempo to {} (0x{:x})",
                    frame.tempo(),
                    frame.tempo()
                )?;
            }
            writeln!(f, "    - Frame delay: {}", frame.frame_delay)?;
            if frame.loop_to_target {
                writeln!(f, "    - Loop to target (frame #{})", self.loop_target)?;
            }

            let frame_size = frame.size();
            writeln!(
                f,
                "    [Total length: {} byte{}]",
                frame_size,
                if frame_size == 1 { "" } else { "s" }
            )?;
        }

        let total = self.size();
        writeln!(
            f,
            "[Total song size: {} byte{}]",
            total,
            if total == 1 { "" } else { "s" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_size_counts_injected_tempo() {
        let mut song = NmosSong::default();
        song.frames.push(Frame::new()); // blank, but frame 0 widens to 15
        song.frames.push(Frame::new()); // blank, 1 byte
        assert_eq!(song.size(), TEMPO_FRAME_SIZE + 1);
    }

    #[test]
    fn test_song_size_explicit_tempo_on_frame_zero() {
        let mut song = NmosSong::default();
        let mut first = Frame::new();
        first.set_new_tempo(42).unwrap();
        song.frames.push(first);
        assert_eq!(song.size(), TEMPO_FRAME_SIZE);
    }

    #[test]
    fn test_display_lists_frames() {
        let mut song = NmosSong {
            name: "Test".into(),
            author: "Author".into(),
            initial_tempo: 96,
            ..Default::default()
        };
        let mut frame = Frame::new();
        frame.set_square_period(0, 284).unwrap();
        song.frames.push(frame);

        let listing = song.to_string();
        assert!(listing.contains("Frame #0"));
        assert!(listing.contains("(loop target)"));
        assert!(listing.contains("Set period to 284"));
        assert!(listing.contains("Change tempo to 96"));
    }
}
