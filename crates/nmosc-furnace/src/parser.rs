//! Single-pass state machine over the Furnace text export.
//!
//! The file is a sequence of `#`-headed sections: signature, version, song
//! information, sound chips, instruments/wavetables/samples (skipped), and
//! subsongs. Each state carries an explicit record of the required fields it
//! has seen and any mid-parse accumulators; transitions consume these
//! records. Blank lines are ignored everywhere.

use std::io::BufRead;

use crate::cell;
use crate::error::{ParseError, ParseWarning};
use crate::song::{Row, Song, SoundChip, Subsong};

/// Inclusive Furnace version ranges this parser is known to handle.
const SUPPORTED_VERSIONS: &[(i32, i32)] = &[(232, 232)];

fn is_version_supported(version: i32) -> bool {
    SUPPORTED_VERSIONS
        .iter()
        .any(|&(min, max)| version >= min && version <= max)
}

/// Everything parsing produces: the frozen Song IR plus collected warnings.
#[derive(Debug)]
pub struct ParseOutcome {
    /// The parsed song.
    pub song: Song,
    /// Non-fatal observations, in the order they were raised.
    pub warnings: Vec<ParseWarning>,
}

/// Parse a complete Furnace text export.
///
/// Warnings never abort; the first structural failure does. The stream must
/// end inside a subsong's pattern rows, otherwise the file was cut off and
/// an unexpected-EOF error is returned.
pub fn parse<R: BufRead>(reader: R) -> Result<ParseOutcome, ParseError> {
    let mut parser = Parser::new();
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => return Err(parser.fatal(format!("error while reading file: {err}"))),
        };
        parser.handle_line(&line)?;
    }
    parser.finish()
}

#[derive(Debug, Default)]
enum State {
    /// Looking for the `# Furnace Text Export` signature at the top.
    #[default]
    Signature,
    /// Looking for the `generated by Furnace …` version line.
    Version,
    SongInformation(SongInfoState),
    SoundChips(ChipState),
    /// Inside `# Instruments` / `# Wavetables` / `# Samples`, all skipped.
    SkipSections,
    Subsongs(SubsongState),
}

/// Required-field record for the Song Information section.
#[derive(Debug, Default)]
struct SongInfoState {
    name: bool,
    author: bool,
    tuning: bool,
}

impl SongInfoState {
    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.name {
            missing.push("name");
        }
        if !self.author {
            missing.push("author");
        }
        if !self.tuning {
            missing.push("tuning");
        }
        missing
    }
}

/// Mid-parse record for the Sound Chips section.
#[derive(Debug, Default)]
struct ChipState {
    /// Whether a chip block has been opened.
    parsing_chip: bool,
    /// Whether the cursor is inside a fenced flag block.
    parsing_flags: bool,
    id: bool,
    flags: bool,
    chip_type: bool,
    custom_clock: bool,
}

impl ChipState {
    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.id {
            missing.push("id");
        }
        if !self.flags {
            missing.push("flags");
        }
        if !self.chip_type {
            missing.push("chipType");
        }
        if !self.custom_clock {
            missing.push("customClock");
        }
        missing
    }

    fn reset_seen(&mut self) {
        self.id = false;
        self.flags = false;
        self.chip_type = false;
        self.custom_clock = false;
    }
}

/// Mid-parse record for the Subsongs section.
#[derive(Debug, Default)]
struct SubsongState {
    /// Whether a subsong block has been opened.
    parsing_subsong: bool,
    /// Whether the cursor is inside the metadata list of a subsong.
    parsing_metadata: bool,
    /// Whether the cursor is inside the (ignored) orders block.
    parsing_orders: bool,
    /// Whether the cursor is inside pattern rows.
    parsing_rows: bool,
    tick_rate: bool,
    speeds: bool,
    pattern_length: bool,
}

impl SubsongState {
    fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.tick_rate {
            missing.push("tick rate");
        }
        if !self.speeds {
            missing.push("speeds");
        }
        if !self.pattern_length {
            missing.push("pattern length");
        }
        missing
    }

    fn reset_seen(&mut self) {
        self.tick_rate = false;
        self.speeds = false;
        self.pattern_length = false;
    }
}

/// A `- key: value` list element.
fn parse_list_element(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim().strip_prefix("- ")?;
    Some((key, value.trim()))
}

struct Parser {
    line_number: usize,
    state: State,
    song: Song,
    warnings: Vec<ParseWarning>,
}

impl Parser {
    fn new() -> Self {
        Self {
            line_number: 0,
            state: State::default(),
            song: Song::default(),
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(ParseWarning {
            line: self.line_number,
            message,
        });
    }

    fn fatal(&self, message: String) -> ParseError {
        ParseError {
            line: self.line_number,
            message,
        }
    }

    fn handle_line(&mut self, raw: &str) -> Result<(), ParseError> {
        self.line_number += 1;
        let line = raw.trim();
        if line.is_empty() {
            return Ok(());
        }

        let state = std::mem::take(&mut self.state);
        self.state = match state {
            State::Signature => self.handle_signature(line),
            State::Version => self.handle_version(line)?,
            State::SongInformation(st) => self.handle_song_information(line, st)?,
            State::SoundChips(st) => self.handle_sound_chips(line, st)?,
            State::SkipSections => Self::handle_skip_sections(line),
            State::Subsongs(st) => self.handle_subsongs(line, st)?,
        };
        Ok(())
    }

    fn handle_signature(&mut self, line: &str) -> State {
        if line == "# Furnace Text Export" {
            return State::Version;
        }
        self.warn(format!(
            "unexpected text found while looking for the Furnace signature: {line}"
        ));
        State::Signature
    }

    fn handle_version(&mut self, line: &str) -> Result<State, ParseError> {
        if !line.starts_with("generated by Furnace ") {
            return Err(self.fatal(format!(
                "unexpected text found while looking for the Furnace version: {line}"
            )));
        }

        let last = line.split_whitespace().last().unwrap_or("");
        let number = last.trim_matches(|c| c == '(' || c == ')');
        let version: i32 = number.parse().map_err(|_| {
            self.fatal(format!(
                "invalid integer found in Furnace version number: {number}"
            ))
        })?;

        if !is_version_supported(version) {
            self.warn(format!(
                "Furnace version {version} isn't officially supported by this compiler; some things might not work correctly"
            ));
        }
        self.song.version = version;

        Ok(State::SongInformation(SongInfoState::default()))
    }

    fn handle_song_information(
        &mut self,
        line: &str,
        mut st: SongInfoState,
    ) -> Result<State, ParseError> {
        if line == "# Song Information" {
            return Ok(State::SongInformation(st));
        }

        if line == "# Sound Chips" {
            let missing = st.missing();
            if !missing.is_empty() {
                return Err(self.fatal(format!(
                    "missing fields in Song Information section: {}",
                    missing.join(", ")
                )));
            }
            return Ok(State::SoundChips(ChipState::default()));
        }

        let Some((key, value)) = parse_list_element(line) else {
            return Err(self.fatal(format!(
                "error parsing list element when extracting song information: {line}"
            )));
        };

        match key {
            "name" => {
                self.song.name = value.to_string();
                st.name = true;
            }
            "author" => {
                self.song.author = value.to_string();
                st.author = true;
            }
            "album" => self.song.album = value.to_string(),
            "tuning" => {
                self.song.tuning = value.parse().map_err(|_| {
                    self.fatal(format!(
                        "error converting song tuning in text file to a number: {value}"
                    ))
                })?;
                st.tuning = true;
            }
            "system" | "instruments" | "wavetables" | "samples" => {} // Not important.
            _ => self.warn(format!("unknown option in Song Information section: {key}")),
        }

        Ok(State::SongInformation(st))
    }

    fn handle_sound_chips(&mut self, line: &str, mut st: ChipState) -> Result<State, ParseError> {
        if line == "# Sound Chips" {
            return Ok(State::SoundChips(st));
        }

        if line == "# Instruments" {
            if st.parsing_flags {
                self.warn(
                    "didn't finish parsing chip properly in Sound Chips section. This could be because there were no flags present on a chip".to_string(),
                );
            }
            if st.parsing_chip {
                let missing = st.missing();
                if !missing.is_empty() {
                    return Err(self.fatal(format!(
                        "missing fields in Sound Chips section: {}",
                        missing.join(", ")
                    )));
                }
            }
            if self.song.sound_chips.is_empty() {
                return Err(self.fatal("no sound chips were found by the parser".to_string()));
            }
            return Ok(State::SkipSections);
        }

        if st.parsing_flags {
            if line == "```" {
                st.parsing_flags = false;
                return Ok(State::SoundChips(st));
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(self.fatal(format!("invalid chip flag: {line}")));
            };
            let (key, value) = (key.trim(), value.trim());

            let chip_number = self.song.sound_chips.len();
            match key {
                "chipType" => {
                    if value != "4" {
                        return Err(self.fatal(format!(
                            "chip number {chip_number} was expected to be a TI SN76489 (chip type 4), found chip type {value} instead"
                        )));
                    }
                    st.chip_type = true;
                }
                "customClock" => {
                    let clock_div = match value {
                        "4000000" => Some(false),
                        "2000000" => Some(true),
                        _ => {
                            self.warn(format!(
                                "custom clock for chip number {chip_number} should be either 4000000 (4 MHz) or 2000000 (2 MHz) due to hardware limitations; defaulting to 4 MHz"
                            ));
                            None
                        }
                    };
                    let Some(chip) = self.song.sound_chips.last_mut() else {
                        return Err(
                            self.fatal("internal error: parsing flags with no current chip".to_string())
                        );
                    };
                    if let Some(clock_div) = clock_div {
                        chip.clock_div = clock_div;
                    }
                    st.custom_clock = true;
                }
                "clockSel" | "noEasyNoise" | "noPhaseReset" => {} // Not important.
                _ => self.warn(format!("unknown chip flag in Sound Chips section: {key}")),
            }
            return Ok(State::SoundChips(st));
        }

        if line == "- TI SN76489" {
            if st.parsing_chip {
                // Finish the previous chip before starting a new one.
                let missing = st.missing();
                st.reset_seen();
                if !missing.is_empty() {
                    return Err(self.fatal(format!(
                        "missing fields in Sound Chips section: {}",
                        missing.join(", ")
                    )));
                }
            }
            st.parsing_chip = true;
            st.parsing_flags = false;
            let index = self.song.sound_chips.len();
            self.song.sound_chips.push(SoundChip {
                index,
                clock_div: false,
            });
            return Ok(State::SoundChips(st));
        }

        if line == "```" {
            st.parsing_flags = true;
            return Ok(State::SoundChips(st));
        }

        let Some((key, value)) = parse_list_element(line) else {
            return Err(self.fatal(format!(
                "error parsing list element when extracting sound chips: {line}"
            )));
        };
        if self.song.sound_chips.is_empty() {
            return Err(self.fatal("no current chip while parsing".to_string()));
        }

        match key {
            "id" => {
                st.id = true;
                if value != "04" {
                    return Err(self.fatal(format!(
                        "expected chip id 04 in Sound Chips section, found id {value} instead. Make sure you choose 'TI SN76489' as the sound chip in Furnace"
                    )));
                }
            }
            "flags" => st.flags = true,
            "volume" | "panning" | "front/rear" => {} // Not important.
            _ => self.warn(format!("unknown option in Sound Chips section: {key}")),
        }

        Ok(State::SoundChips(st))
    }

    fn handle_skip_sections(line: &str) -> State {
        if line == "# Subsongs" {
            return State::Subsongs(SubsongState::default());
        }
        // Everything inside the instrument/wavetable/sample sections is
        // irrelevant to the SN76489 output.
        State::SkipSections
    }

    fn handle_subsongs(&mut self, line: &str, mut st: SubsongState) -> Result<State, ParseError> {
        if line == "# Subsongs" {
            return Ok(State::Subsongs(st));
        }

        // Subsong and pattern markers take precedence over row parsing so a
        // following subsong header is never read as a row line.
        if let Some(rest) = line.strip_prefix("## ") {
            return self.handle_subsong_marker(line, rest, st);
        }

        if st.parsing_rows {
            self.handle_row_line(line)?;
            return Ok(State::Subsongs(st));
        }

        if st.parsing_metadata {
            self.handle_subsong_metadata(line, &mut st)?;
            return Ok(State::Subsongs(st));
        }

        // Order lists and anything before the first subsong header are
        // ignored.
        Ok(State::Subsongs(st))
    }

    fn handle_subsong_marker(
        &mut self,
        line: &str,
        rest: &str,
        mut st: SubsongState,
    ) -> Result<State, ParseError> {
        if rest == "Patterns" {
            if st.parsing_orders {
                st.parsing_orders = false;
                st.parsing_rows = true;
            }
            // Nothing else to do; orders are not interesting.
            return Ok(State::Subsongs(st));
        }

        let expected_index = self.song.subsongs.len();
        let header = rest
            .split_once(':')
            .and_then(|(key, name)| Some((key.trim().parse::<usize>().ok()?, name.trim())));
        let Some((claimed_index, name)) = header else {
            self.warn(format!(
                "unexpected text found while looking for a subsong start: {line}"
            ));
            return Ok(State::Subsongs(st));
        };

        if claimed_index != expected_index {
            self.warn(format!(
                "expected subsong index {expected_index}, got index {claimed_index} instead"
            ));
        }

        // A new subsong may only start before any subsong was opened, or
        // after the previous one reached its pattern rows.
        if st.parsing_subsong != st.parsing_rows {
            self.warn(format!(
                "unexpected text found while parsing subsong {}: {line}",
                expected_index.saturating_sub(1)
            ));
            return Ok(State::Subsongs(st));
        }

        if st.parsing_subsong {
            if st.parsing_metadata {
                return Err(self
                    .fatal("didn't finish parsing subsong metadata in Subsongs section".to_string()));
            }
            if st.parsing_orders {
                return Err(self
                    .fatal("didn't finish parsing subsong orders in Subsongs section".to_string()));
            }
            let missing = st.missing();
            st.reset_seen();
            if !missing.is_empty() {
                return Err(self.fatal(format!(
                    "missing fields in Subsongs section: {}",
                    missing.join(", ")
                )));
            }
        }

        st.parsing_subsong = true;
        st.parsing_metadata = true;
        st.parsing_orders = false;
        st.parsing_rows = false;
        self.song
            .subsongs
            .push(Subsong::new(expected_index, name.to_string()));

        Ok(State::Subsongs(st))
    }

    fn handle_subsong_metadata(
        &mut self,
        line: &str,
        st: &mut SubsongState,
    ) -> Result<(), ParseError> {
        if line == "orders:" {
            st.parsing_metadata = false;
            st.parsing_orders = true;
            return Ok(());
        }

        let Some((key, value)) = parse_list_element(line) else {
            return Err(self.fatal(format!(
                "error parsing list element when extracting subsong metadata: {line}"
            )));
        };

        match key {
            "tick rate" => {
                let tick_rate: f64 = value.parse().map_err(|_| {
                    self.fatal(format!(
                        "error converting subsong tick rate in text file to a number: {value}"
                    ))
                })?;
                if tick_rate.is_nan() || tick_rate <= 0.0 {
                    return Err(self.fatal(format!(
                        "subsong tick rate must be a positive number, got {value}"
                    )));
                }
                self.current_subsong()?.tick_rate = tick_rate;
                st.tick_rate = true;
            }
            "speeds" => {
                let speeds = self.parse_speeds_list(value)?;
                self.current_subsong()?.speeds = speeds;
                st.speeds = true;
            }
            "time base" => {
                let time_base: i32 = value.parse().map_err(|_| {
                    self.fatal(format!(
                        "error converting subsong time base in text file to a number: {value}"
                    ))
                })?;
                self.current_subsong()?.time_base = time_base;
            }
            "pattern length" => {
                let pattern_length: u8 = value.parse().map_err(|_| {
                    self.fatal(format!(
                        "error converting pattern length in text file to a number: {value}"
                    ))
                })?;
                if pattern_length == 0 {
                    return Err(
                        self.fatal("pattern length must be greater than zero".to_string())
                    );
                }
                self.current_subsong()?.pattern_length = pattern_length;
                st.pattern_length = true;
            }
            "virtual tempo" => {} // Not important.
            _ => self.warn(format!("unknown option in Subsongs section: {key}")),
        }

        Ok(())
    }

    fn handle_row_line(&mut self, line: &str) -> Result<(), ParseError> {
        if line.starts_with("----- ORDER") {
            return Ok(());
        }

        let fields: Vec<&str> = line.split('|').filter(|field| !field.is_empty()).collect();

        let row_index = match self.song.subsongs.last() {
            Some(subsong) => subsong.rows.len(),
            None => return Err(self.fatal("no current subsong while parsing".to_string())),
        };
        let mut row = Row {
            index: row_index,
            ..Default::default()
        };

        for (i, field) in fields.iter().enumerate() {
            if i == 0 {
                // The first field is the row address.
                continue;
            }
            let channel_index = i - 1;
            if channel_index > 3 {
                self.warn(format!(
                    "ignoring cell for channel {channel_index}; the SN76489 only has channels 0-3"
                ));
                continue;
            }

            let (mut note, effects) = cell::parse_cell(field).map_err(|err| {
                self.fatal(format!("error parsing note in channel {channel_index}: {err}"))
            })?;
            note.channel = channel_index as u8;

            row.notes.push(note);
            row.effects.extend(effects);
        }

        if let Some(subsong) = self.song.subsongs.last_mut() {
            subsong.rows.push(row);
        }
        Ok(())
    }

    /// 1..16 whitespace-separated speed values, each 1..255. More than one
    /// value forms a groove pattern, which the compiler does not support.
    fn parse_speeds_list(&mut self, value: &str) -> Result<Vec<u8>, ParseError> {
        let tokens: Vec<&str> = value.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(self.fatal("expected 1..16 numbers in speeds list, got none".to_string()));
        }
        // TODO: lift this once the lowering engine can cycle speeds per row.
        if tokens.len() > 1 {
            return Err(
                self.fatal("compiler doesn't currently support groove patterns".to_string())
            );
        }
        if tokens.len() > 16 {
            self.warn(format!(
                "speeds list contains {} numbers, only first 16 will be used",
                tokens.len()
            ));
        }

        let count = tokens.len().min(16);
        let mut speeds = Vec::with_capacity(count);
        for (i, token) in tokens.iter().take(count).enumerate() {
            let speed: i64 = token.parse().map_err(|_| {
                self.fatal(format!(
                    "token {} ({token:?}) in speeds list is not a valid integer",
                    i + 1
                ))
            })?;
            if !(1..=255).contains(&speed) {
                return Err(self.fatal(format!(
                    "token {} ({token:?}) in speeds list must be in the range 1..255",
                    i + 1
                )));
            }
            speeds.push(speed as u8);
        }

        Ok(speeds)
    }

    fn current_subsong(&mut self) -> Result<&mut Subsong, ParseError> {
        let line = self.line_number;
        self.song.subsongs.last_mut().ok_or(ParseError {
            line,
            message: "no current subsong while parsing".to_string(),
        })
    }

    fn finish(self) -> Result<ParseOutcome, ParseError> {
        // The file must end inside a subsong's pattern rows; anything else
        // means it was cut off. A song with no notes at all still reaches
        // row parsing, so this check only rejects truncated files.
        let complete = matches!(
            &self.state,
            State::Subsongs(st) if st.parsing_subsong && st.parsing_rows
        );
        if !complete {
            return Err(self.fatal("unexpected EOF".to_string()));
        }

        Ok(ParseOutcome {
            song: self.song,
            warnings: self.warnings,
        })
    }
}
