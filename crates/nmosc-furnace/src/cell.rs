//! The fixed-width channel cell grammar.
//!
//! Each channel cell of a pattern row is `PPP II VV` followed by any number
//! of four-character effect groups: a 3-character pitch, a 2-character
//! instrument number (ignored by this compiler), a 2-character volume, and
//! the effects. Whitespace inside a cell carries no meaning and is stripped
//! before slicing.

use crate::error::CellError;
use crate::song::{Effect, Note};

/// Semitone offset of each note letter within an octave.
fn note_base(letter: u8) -> i32 {
    match letter {
        b'C' => 0,
        b'D' => 2,
        b'E' => 4,
        b'F' => 5,
        b'G' => 7,
        b'A' => 9,
        b'B' => 11,
        _ => unreachable!("letter validated before lookup"),
    }
}

/// Whether a 3-character pitch string is well formed.
///
/// The first character is a letter `A`-`G`. The second encodes the
/// accidental and the octave sign: `#` sharp / `-` natural for octaves
/// `>= 0`, `+` sharp / `_` natural for octaves `< 0`. The third is the
/// octave magnitude `0`-`7`; negative octaves only go down to 5, giving an
/// overall range of -5 through 7.
///
/// # Examples
/// ```
/// use nmosc_furnace::cell::is_valid_pitch;
///
/// assert!(is_valid_pitch("C-4"));
/// assert!(is_valid_pitch("A+5"));
/// assert!(!is_valid_pitch("A_6")); // negative octaves stop at 5
/// assert!(!is_valid_pitch("H-4")); // no such letter
/// ```
pub fn is_valid_pitch(pitch: &str) -> bool {
    let bytes = pitch.as_bytes();
    if bytes.len() != 3 {
        return false;
    }

    let letter = bytes[0].to_ascii_uppercase();
    let accidental = bytes[1];
    let octave_digit = bytes[2];

    if !(b'A'..=b'G').contains(&letter) {
        return false;
    }
    if !(b'0'..=b'7').contains(&octave_digit) {
        return false;
    }
    match accidental {
        b'#' | b'-' => true,
        b'+' | b'_' => octave_digit <= b'5',
        _ => false,
    }
}

/// Parse a 3-character pitch string into a MIDI note number.
///
/// # Examples
/// ```
/// use nmosc_furnace::cell::parse_pitch;
///
/// assert_eq!(parse_pitch("C-4").unwrap(), 60);
/// assert_eq!(parse_pitch("A-4").unwrap(), 69);
/// assert_eq!(parse_pitch("A+5").unwrap(), -38);
/// ```
pub fn parse_pitch(pitch: &str) -> Result<i32, CellError> {
    if !is_valid_pitch(pitch) {
        return Err(CellError::InvalidPitch(pitch.to_string()));
    }

    let bytes = pitch.as_bytes();
    let letter = bytes[0].to_ascii_uppercase();
    let accidental = bytes[1];

    let mut octave = (bytes[2] - b'0') as i32;
    if accidental == b'+' || accidental == b'_' {
        octave = -octave;
    }
    let accidental = match accidental {
        b'#' | b'+' => 1,
        _ => 0,
    };

    Ok((octave + 1) * 12 + note_base(letter) + accidental)
}

/// Whether a 2-character volume string is well formed: hex `00` through
/// `0F`. (The no-change marker `..` is handled by the cell parser.)
pub fn is_valid_volume(volume: &str) -> bool {
    let bytes = volume.as_bytes();
    bytes.len() == 2 && bytes[0] == b'0' && bytes[1].is_ascii_hexdigit()
}

/// Parse a 2-character volume string into a value 0-15.
pub fn parse_volume(volume: &str) -> Result<u8, CellError> {
    if !is_valid_volume(volume) {
        return Err(CellError::InvalidVolume(volume.to_string()));
    }
    u8::from_str_radix(volume, 16).map_err(|_| CellError::InvalidVolume(volume.to_string()))
}

/// Parse a 4-character effect group into an [`Effect`].
///
/// The first two characters are the hexadecimal effect id, the last two the
/// value (`..` means zero). Tick rate effects span ids `C0`-`CF` because
/// their value is 12-bit and rolls over into the id byte.
///
/// # Examples
/// ```
/// use nmosc_furnace::cell::parse_effect;
/// use nmosc_furnace::song::Effect;
///
/// assert_eq!(parse_effect("C800").unwrap(), Effect::TickRateHz(0x800));
/// assert_eq!(parse_effect("0B03").unwrap(), Effect::JumpToPattern(3));
/// assert_eq!(parse_effect("FF..").unwrap(), Effect::StopSong);
/// ```
pub fn parse_effect(effect: &str) -> Result<Effect, CellError> {
    if effect.len() != 4 || !effect.is_ascii() {
        return Err(CellError::InvalidEffect(effect.to_string()));
    }

    let id = u8::from_str_radix(&effect[0..2], 16)
        .map_err(|_| CellError::InvalidEffect(effect.to_string()))?;

    if (0xC0..=0xCF).contains(&id) {
        // The value is 12-bit: the low nibble of the id is the high nibble
        // of the value.
        let value = if &effect[2..4] == ".." {
            ((id & 0x0f) as u16) << 8
        } else {
            u16::from_str_radix(&effect[1..4], 16)
                .map_err(|_| CellError::InvalidEffect(effect.to_string()))?
        };
        return Ok(Effect::TickRateHz(value));
    }

    let value = if &effect[2..4] == ".." {
        0u16
    } else {
        u8::from_str_radix(&effect[2..4], 16)
            .map_err(|_| CellError::InvalidEffect(effect.to_string()))? as u16
    };

    match id {
        0x0B => Ok(Effect::JumpToPattern(value)),
        0x0D => Ok(Effect::JumpToNextPattern),
        0x09 | 0x0F => Ok(Effect::Speed(value)),
        0x20 => Ok(Effect::NoiseControl(value)),
        0xF0 => Ok(Effect::TickRateBpm(value)),
        0xFF => Ok(Effect::StopSong),
        _ => Err(CellError::UnknownEffect(effect.to_string())),
    }
}

/// Parse a whole channel cell into a note and its effects.
///
/// The pitch field is `...` for no pitch or `OFF` for a note-off (which
/// also clears the volume); the volume field is `..` for no change. Empty
/// effect groups (`....`) are not stored.
pub fn parse_cell(raw: &str) -> Result<(Note, Vec<Effect>), CellError> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    // 3 (pitch) + 2 (instrument) + 2 (volume) + 4 per effect.
    if !cleaned.is_ascii() || cleaned.len() < 7 || (cleaned.len() - 7) % 4 != 0 {
        return Err(CellError::InvalidCell(raw.trim().to_string()));
    }

    let mut note = Note::default();

    match &cleaned[0..3] {
        "..." => {}
        "OFF" => note.off = true,
        pitch => {
            note.pitch = parse_pitch(pitch)?;
            note.has_pitch = true;
        }
    }

    // A note-off never carries a volume.
    if !note.off {
        match &cleaned[5..7] {
            ".." => {}
            volume => {
                note.volume = parse_volume(volume)?;
                note.has_volume = true;
            }
        }
    }

    let mut effects = Vec::new();
    let mut rest = &cleaned[7..];
    while !rest.is_empty() {
        let group = &rest[0..4];
        if group != "...." {
            effects.push(parse_effect(group)?);
        }
        rest = &rest[4..];
    }

    Ok((note, effects))
}
