//! Row-by-row translation of a subsong into an NMOScillator song.
//!
//! The lowering engine walks one subsong's rows, interprets effect commands
//! and note cells against running playback state (current tempo, speed,
//! channel volumes, noise configuration), and appends one frame per row,
//! coalescing blank rows into the previous frame's delay where possible.

use nmosc_nmos::{find_best_rate, square_period, Frame, FrameError, NmosSong, NoiseMode, NoiseRate};

use crate::error::LowerError;
use crate::song::{Effect, Song, Subsong};

/// SN76489 base clock with the divider off.
const CLOCK_RATE_HZ: f64 = 4_000_000.0;

/// Where the noise channel takes its shift rate from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoiseRateSource {
    /// The rate tracks square channel 3's period.
    Channel3,
    /// One of the three fixed rates, chosen by the next noise-channel pitch.
    Preset,
}

/// Convert a MIDI note number to a frequency for a given A4 tuning.
///
/// Furnace notates octaves two below their acoustic value, so the pitch is
/// bumped up two octaves before converting.
fn pitch_to_freq(pitch: i32, tuning: f64) -> f64 {
    let offset_pitch = pitch + 24;
    tuning * 2f64.powf((offset_pitch - 69) as f64 / 12.0)
}

/// The effective tick rate of a subsong: the tracker tick rate divided by
/// the speed and the time base multiplier.
fn scaled_tick_rate(tick_rate: f64, speed: f64, subsong: &Subsong) -> f64 {
    tick_rate / (speed * (subsong.time_base as f64 + 1.0))
}

/// Lower one subsong of a parsed song into an [`NmosSong`].
pub fn lower_subsong(song: &Song, subsong_index: u8) -> Result<NmosSong, LowerError> {
    let Some(subsong) = song.subsongs.get(subsong_index as usize) else {
        return Err(LowerError::NoSuchSubsong {
            index: subsong_index,
            count: song.subsongs.len(),
        });
    };
    // Only one sound chip exists on the NMOScillator, so the first chip in
    // the file is the one that gets compiled.
    let Some(chip) = song.sound_chips.first() else {
        return Err(LowerError::NoSoundChips);
    };
    if chip.clock_div {
        return Err(LowerError::ClockDivUnsupported);
    }
    let clock_rate = CLOCK_RATE_HZ;

    let mut name = String::new();
    if !song.name.is_empty() {
        name.push_str(&song.name);
        if !subsong.name.is_empty() {
            name.push_str(" - ");
        }
    }
    if !subsong.name.is_empty() {
        name.push_str(&subsong.name);
    }
    if !song.album.is_empty() {
        name.push_str(&format!(" (from {})", song.album));
    }

    let first_speed = subsong.speeds[0];
    let target = scaled_tick_rate(subsong.tick_rate, first_speed as f64, subsong);
    let fit = find_best_rate(target).ok_or(LowerError::TempoUnreachable { target })?;

    let mut out = NmosSong {
        name,
        author: song.author.clone(),
        initial_tempo: fit.tempo,
        clock_div: chip.clock_div,
        frames: Vec::new(),
        loop_target: 0,
    };
    let mut base_frame_delay = fit.frame_delay;

    // The reset frame silences every channel and puts the noise channel
    // into white/channel-3 mode before the first row plays.
    let mut reset = Frame::new();
    reset.set_noise_control(NoiseMode::White, NoiseRate::Channel3)?;
    for channel in 0..4 {
        reset.set_attenuation(channel, 0xf)?;
    }
    out.frames.push(reset);

    let mut noise_source = NoiseRateSource::Channel3;
    let mut noise_mode = NoiseMode::Periodic;
    let mut current_speed = first_speed;
    let mut current_tick_rate = subsong.tick_rate;
    let mut channel_volumes = [0xfu8; 4];
    let mut channel_offs = [true; 4];
    let mut is_halted = false;
    let mut is_looped = false;

    let pattern_length = subsong.pattern_length as usize;

    let mut row_index = 0;
    while row_index < subsong.rows.len() {
        let row = &subsong.rows[row_index];
        let mut next_index = row_index + 1;

        let mut frame = Frame::new();
        let mut is_blank = true;

        for effect in &row.effects {
            match *effect {
                Effect::JumpToPattern(value) => {
                    let current_pattern = row_index / pattern_length;
                    if value as usize > current_pattern {
                        // Forward skip.
                        next_index = value as usize * pattern_length;
                    } else {
                        // Jumping to the current pattern or earlier loops
                        // the song. +1 offsets past the reset frame.
                        out.loop_target = value as usize * pattern_length + 1;
                        is_looped = true;
                        is_blank = false;
                    }
                }
                Effect::JumpToNextPattern => {
                    let current_pattern = row_index / pattern_length;
                    next_index = (current_pattern + 1) * pattern_length;
                }
                Effect::Speed(value) => {
                    if subsong.speeds.len() > 1 {
                        // Changing speed mid-groove has no defined mapping;
                        // the effect is ignored. (Grooves are currently
                        // rejected at parse time anyway.)
                    } else {
                        let target =
                            scaled_tick_rate(current_tick_rate, value as f64, subsong);
                        let fit = find_best_rate(target)
                            .ok_or(LowerError::TempoUnreachable { target })?;
                        base_frame_delay = fit.frame_delay;
                        frame.set_new_tempo(fit.tempo)?;
                        current_speed = value as u8;
                        is_blank = false;
                    }
                }
                Effect::NoiseControl(value) => {
                    noise_source = if value >> 4 == 1 {
                        NoiseRateSource::Channel3
                    } else {
                        NoiseRateSource::Preset
                    };
                    noise_mode = if value % 16 == 1 {
                        NoiseMode::White
                    } else {
                        NoiseMode::Periodic
                    };
                    if noise_source == NoiseRateSource::Channel3 {
                        frame.set_noise_control(noise_mode, NoiseRate::Channel3)?;
                    }
                    // A preset source reaches the chip only when the next
                    // pitch lands on the noise channel.
                    is_blank = false;
                }
                Effect::TickRateHz(value) => {
                    let target =
                        scaled_tick_rate(value as f64, current_speed as f64, subsong);
                    let fit =
                        find_best_rate(target).ok_or(LowerError::TempoUnreachable { target })?;
                    base_frame_delay = fit.frame_delay;
                    frame.set_new_tempo(fit.tempo)?;
                    current_tick_rate = value as f64;
                    is_blank = false;
                }
                Effect::TickRateBpm(value) => {
                    // Furnace assumes 24 ticks per beat.
                    let tick_rate_hz = value as f64 * 24.0 / 60.0;
                    let target =
                        scaled_tick_rate(tick_rate_hz, current_speed as f64, subsong);
                    let fit =
                        find_best_rate(target).ok_or(LowerError::TempoUnreachable { target })?;
                    base_frame_delay = fit.frame_delay;
                    frame.set_new_tempo(fit.tempo)?;
                    current_tick_rate = tick_rate_hz;
                    is_blank = false;
                }
                Effect::StopSong => {
                    // The NMOScillator has no way of halting playback; the
                    // song is sent into an infinite loop here instead.
                    is_halted = true;
                    is_blank = false;
                }
            }
        }

        frame.frame_delay = base_frame_delay;

        for note in &row.notes {
            let channel = note.channel;
            if channel > 3 {
                return Err(LowerError::Frame(FrameError::ChannelOutOfRange(channel)));
            }
            if note.has_volume && note.volume > 0xf {
                return Err(LowerError::Frame(FrameError::AttenuationOutOfRange(
                    note.volume,
                )));
            }

            if note.off {
                frame.set_attenuation(channel, 0xf)?;
                channel_offs[channel as usize] = true;
                is_blank = false;
            }

            if note.has_volume {
                if !channel_offs[channel as usize] {
                    frame.set_attenuation(channel, 0xf - note.volume)?;
                }
                channel_volumes[channel as usize] = note.volume;
                is_blank = false;
            }

            if note.has_pitch {
                if channel < 3 {
                    let period =
                        square_period(pitch_to_freq(note.pitch, song.tuning), clock_rate);
                    frame.set_square_period(channel, period)?;
                } else {
                    match noise_source {
                        NoiseRateSource::Channel3 => {
                            // The noise rate follows square channel 3, so
                            // the pitch lands on that channel's period.
                            let period =
                                square_period(pitch_to_freq(note.pitch, song.tuning), clock_rate);
                            frame.set_square_period(2, period)?;
                        }
                        NoiseRateSource::Preset => {
                            // C, C# and D select the fixed rates; any other
                            // pitch has no preset to map to.
                            let preset = match note.pitch % 12 {
                                0 => NoiseRate::Low,
                                1 => NoiseRate::Medium,
                                2 => NoiseRate::High,
                                _ => {
                                    return Err(LowerError::NoisePresetOutOfRange {
                                        pitch: note.pitch,
                                    })
                                }
                            };
                            frame.set_noise_control(noise_mode, preset)?;
                        }
                    }
                }
                if channel_offs[channel as usize] {
                    // A pitch on a silenced channel turns it back on at its
                    // last known volume.
                    frame.set_attenuation(channel, 0xf - channel_volumes[channel as usize])?;
                    channel_offs[channel as usize] = false;
                }
                is_blank = false;
            }
        }

        row_index = next_index;

        if is_blank {
            // Extend the previous frame's delay instead of appending a
            // blank frame, unless the delay would overflow or the next
            // frame slot is the loop target (absorbing that slot would
            // shift the loop point).
            let at_loop_target = out.frames.len() == out.loop_target;
            if let Some(prev) = out.frames.last_mut() {
                if !at_loop_target
                    && prev.frame_delay as u16 + base_frame_delay as u16 <= 255
                {
                    prev.frame_delay += base_frame_delay;
                    continue;
                }
            }
        }

        if is_halted {
            out.loop_target = out.frames.len();
            out.frames.push(frame);
            let mut terminal = Frame::new();
            terminal.loop_to_target = true;
            out.frames.push(terminal);
            break;
        }

        out.frames.push(frame);

        if is_looped {
            let mut terminal = Frame::new();
            terminal.loop_to_target = true;
            out.frames.push(terminal);
            break;
        }
    }

    if !(is_halted || is_looped) {
        // No loop or halt effect: default to looping back to the start,
        // which is what Furnace itself does.
        let mut terminal = Frame::new();
        terminal.loop_to_target = true;
        out.frames.push(terminal);
        out.loop_target = 0;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::{Note, Row, SoundChip};
    use nmosc_nmos::Command;

    fn chip_song(subsong: Subsong) -> Song {
        Song {
            name: "Song".into(),
            author: "Author".into(),
            sound_chips: vec![SoundChip {
                index: 0,
                clock_div: false,
            }],
            subsongs: vec![subsong],
            ..Default::default()
        }
    }

    fn subsong_with_rows(rows: Vec<Row>) -> Subsong {
        Subsong {
            tick_rate: 60.0,
            pattern_length: 1,
            ..Subsong::new(0, String::new())
        }
        .with_rows(rows)
    }

    impl Subsong {
        fn with_rows(mut self, rows: Vec<Row>) -> Self {
            self.rows = rows;
            self
        }
    }

    fn blank_row(index: usize) -> Row {
        Row {
            index,
            notes: vec![
                Note {
                    channel: 0,
                    ..Default::default()
                },
                Note {
                    channel: 1,
                    ..Default::default()
                },
                Note {
                    channel: 2,
                    ..Default::default()
                },
                Note {
                    channel: 3,
                    ..Default::default()
                },
            ],
            effects: Vec::new(),
        }
    }

    fn row_with_effects(index: usize, effects: Vec<Effect>) -> Row {
        Row {
            effects,
            ..blank_row(index)
        }
    }

    #[test]
    fn test_title_assembly() {
        let mut song = chip_song(subsong_with_rows(vec![blank_row(0)]));
        song.album = "Album".into();
        song.subsongs[0].name = "Part 1".into();
        let lowered = lower_subsong(&song, 0).unwrap();
        assert_eq!(lowered.name, "Song - Part 1 (from Album)");
        assert_eq!(lowered.author, "Author");
    }

    #[test]
    fn test_minimal_song_coalesces_blank_row() {
        let song = chip_song(subsong_with_rows(vec![blank_row(0)]));
        let lowered = lower_subsong(&song, 0).unwrap();

        // Reset frame (with the blank row folded into its delay) plus the
        // terminal loop frame.
        assert_eq!(lowered.frames.len(), 2);
        assert_eq!(lowered.loop_target, 0);
        assert!(lowered.frames[1].loop_to_target);
        // 60 Hz over speed 3 is 20 Hz, which needs a nonzero frame delay;
        // the blank row added one delay unit to the reset frame.
        assert!(lowered.frames[0].frame_delay > 0);
    }

    #[test]
    fn test_note_emits_period_and_reenables_channel() {
        let mut row = blank_row(0);
        row.notes[0] = Note {
            pitch: 45, // sounds as A4 = 440 Hz after the two-octave shift
            has_pitch: true,
            channel: 0,
            ..Default::default()
        };
        let song = chip_song(subsong_with_rows(vec![row]));
        let lowered = lower_subsong(&song, 0).unwrap();

        let content = &lowered.frames[1];
        assert_eq!(
            content.commands(),
            &[
                Command::SetSquarePeriod {
                    channel: 0,
                    period: 284
                },
                // Channel was off, so it is re-enabled at full volume.
                Command::SetAttenuation {
                    channel: 0,
                    attenuation: 0
                },
            ]
        );
    }

    #[test]
    fn test_volume_on_silent_channel_is_latched_not_emitted() {
        let mut row = blank_row(0);
        row.notes[1] = Note {
            volume: 10,
            has_volume: true,
            channel: 1,
            ..Default::default()
        };
        let mut second = blank_row(1);
        second.notes[1] = Note {
            pitch: 60,
            has_pitch: true,
            channel: 1,
            ..Default::default()
        };
        let song = chip_song(subsong_with_rows(vec![row, second]));
        let lowered = lower_subsong(&song, 0).unwrap();

        // Row 0: the channel is off, so no attenuation command is emitted.
        assert!(lowered.frames[1].commands().is_empty());
        // Row 1: the pitch re-enables the channel at the latched volume 10,
        // i.e. attenuation 5.
        assert!(lowered.frames[2]
            .commands()
            .iter()
            .any(|c| matches!(
                c,
                Command::SetAttenuation {
                    channel: 1,
                    attenuation: 5
                }
            )));
    }

    #[test]
    fn test_halt_effect_terminates_song() {
        let song = chip_song(subsong_with_rows(vec![
            blank_row(0),
            row_with_effects(1, vec![Effect::StopSong]),
            blank_row(2),
        ]));
        let lowered = lower_subsong(&song, 0).unwrap();

        // Reset (+ coalesced row 0), halt row, terminal. Row 2 is never
        // reached.
        assert_eq!(lowered.frames.len(), 3);
        assert_eq!(lowered.loop_target, 1);
        assert!(lowered.frames[2].loop_to_target);
    }

    #[test]
    fn test_backward_jump_loops() {
        let song = chip_song(subsong_with_rows(vec![
            blank_row(0),
            row_with_effects(1, vec![Effect::JumpToPattern(0)]),
        ]));
        let lowered = lower_subsong(&song, 0).unwrap();

        // Row 1 sits in pattern 1 (pattern length 1), so jumping to pattern
        // 0 is a backward loop to frame 1.
        assert_eq!(lowered.loop_target, 1);
        assert_eq!(lowered.frames.len(), 3);
        assert!(lowered.frames[2].loop_to_target);
    }

    #[test]
    fn test_forward_jump_skips_rows() {
        let mut marker = blank_row(3);
        marker.notes[0] = Note {
            pitch: 60,
            has_pitch: true,
            channel: 0,
            ..Default::default()
        };
        let song = chip_song(
            Subsong {
                tick_rate: 60.0,
                pattern_length: 1,
                ..Subsong::new(0, String::new())
            }
            .with_rows(vec![
                row_with_effects(0, vec![Effect::JumpToPattern(3)]),
                blank_row(1), // skipped
                blank_row(2), // skipped
                marker,
            ]),
        );
        let lowered = lower_subsong(&song, 0).unwrap();

        // The jump row is blank (forward jumps emit nothing) and coalesces
        // into the reset frame; rows 1 and 2 are never visited. Only the
        // marker row contributes commands.
        let period_frames: Vec<_> = lowered
            .frames
            .iter()
            .filter(|f| {
                f.commands()
                    .iter()
                    .any(|c| matches!(c, Command::SetSquarePeriod { .. }))
            })
            .collect();
        assert_eq!(period_frames.len(), 1);
        // Rows 1 and 2 contributed nothing.
        assert_eq!(lowered.frames.len(), 3);
    }

    #[test]
    fn test_jump_to_next_pattern() {
        let mut marker = blank_row(2);
        marker.notes[0] = Note {
            pitch: 60,
            has_pitch: true,
            channel: 0,
            ..Default::default()
        };
        let song = chip_song(
            Subsong {
                tick_rate: 60.0,
                pattern_length: 2,
                ..Subsong::new(0, String::new())
            }
            .with_rows(vec![
                row_with_effects(0, vec![Effect::JumpToNextPattern]),
                blank_row(1), // skipped
                marker,
            ]),
        );
        let lowered = lower_subsong(&song, 0).unwrap();
        assert_eq!(lowered.frames.len(), 3);
    }

    #[test]
    fn test_tick_rate_effect_sets_frame_tempo() {
        let song = chip_song(subsong_with_rows(vec![row_with_effects(
            0,
            vec![Effect::TickRateHz(128)],
        )]));
        let lowered = lower_subsong(&song, 0).unwrap();

        let frame = &lowered.frames[1];
        assert!(frame.has_tempo_change());
        // 128 Hz over speed 3 is ~42.67 Hz; the solver fit must satisfy the
        // formula within tolerance.
        let achieved =
            nmosc_nmos::effective_tick_rate(frame.tempo(), frame.frame_delay);
        let target = 128.0 / 3.0;
        assert!((achieved - target).abs() / target <= nmosc_nmos::MAX_RATE_ERROR);
    }

    #[test]
    fn test_bpm_effect_converts_to_hertz() {
        let song = chip_song(subsong_with_rows(vec![row_with_effects(
            0,
            vec![Effect::TickRateBpm(150)],
        )]));
        let lowered = lower_subsong(&song, 0).unwrap();

        let frame = &lowered.frames[1];
        assert!(frame.has_tempo_change());
        // 150 BPM at 24 ticks per beat is 60 Hz; over speed 3 that is 20 Hz.
        let achieved =
            nmosc_nmos::effective_tick_rate(frame.tempo(), frame.frame_delay);
        assert!((achieved - 20.0).abs() / 20.0 <= nmosc_nmos::MAX_RATE_ERROR);
    }

    #[test]
    fn test_noise_preset_deferred_until_pitch() {
        let mut pitch_row = blank_row(1);
        pitch_row.notes[3] = Note {
            pitch: 62, // D: the high preset
            has_pitch: true,
            channel: 3,
            ..Default::default()
        };
        let song = chip_song(subsong_with_rows(vec![
            // Preset source, white mode.
            row_with_effects(0, vec![Effect::NoiseControl(0x01)]),
            pitch_row,
        ]));
        let lowered = lower_subsong(&song, 0).unwrap();

        // The effect row emits no noise command of its own.
        assert!(lowered.frames[1].commands().is_empty());
        // The pitch row carries the deferred preset plus the channel
        // re-enable.
        assert_eq!(
            lowered.frames[2].commands(),
            &[
                Command::SetNoiseControl {
                    mode: NoiseMode::White,
                    rate: NoiseRate::High
                },
                Command::SetAttenuation {
                    channel: 3,
                    attenuation: 0
                },
            ]
        );
    }

    #[test]
    fn test_noise_channel3_source_sets_period_immediately() {
        let mut pitch_row = blank_row(1);
        pitch_row.notes[3] = Note {
            pitch: 45,
            has_pitch: true,
            channel: 3,
            ..Default::default()
        };
        let song = chip_song(subsong_with_rows(vec![
            row_with_effects(0, vec![Effect::NoiseControl(0x11)]),
            pitch_row,
        ]));
        let lowered = lower_subsong(&song, 0).unwrap();

        // The effect row reconfigures the noise channel at once.
        assert_eq!(
            lowered.frames[1].commands(),
            &[Command::SetNoiseControl {
                mode: NoiseMode::White,
                rate: NoiseRate::Channel3
            }]
        );
        // The pitch row drives square channel 3's period slot (channel 2).
        assert_eq!(
            lowered.frames[2].commands(),
            &[
                Command::SetSquarePeriod {
                    channel: 2,
                    period: 284
                },
                Command::SetAttenuation {
                    channel: 3,
                    attenuation: 0
                },
            ]
        );
    }

    #[test]
    fn test_noise_preset_out_of_range() {
        let mut pitch_row = blank_row(1);
        pitch_row.notes[3] = Note {
            pitch: 64, // E: no preset for it
            has_pitch: true,
            channel: 3,
            ..Default::default()
        };
        let song = chip_song(subsong_with_rows(vec![
            row_with_effects(0, vec![Effect::NoiseControl(0x00)]),
            pitch_row,
        ]));
        let err = lower_subsong(&song, 0).unwrap_err();
        assert!(matches!(
            err,
            LowerError::NoisePresetOutOfRange { pitch: 64 }
        ));
    }

    #[test]
    fn test_clock_div_rejected() {
        let mut song = chip_song(subsong_with_rows(vec![blank_row(0)]));
        song.sound_chips[0].clock_div = true;
        assert!(matches!(
            lower_subsong(&song, 0),
            Err(LowerError::ClockDivUnsupported)
        ));
    }

    #[test]
    fn test_missing_subsong_rejected() {
        let song = chip_song(subsong_with_rows(vec![blank_row(0)]));
        assert!(matches!(
            lower_subsong(&song, 5),
            Err(LowerError::NoSuchSubsong { index: 5, count: 1 })
        ));
    }

    #[test]
    fn test_unreachable_tick_rate() {
        let mut song = chip_song(subsong_with_rows(vec![blank_row(0)]));
        song.subsongs[0].tick_rate = 1_000_000.0;
        song.subsongs[0].speeds = vec![1];
        assert!(matches!(
            lower_subsong(&song, 0),
            Err(LowerError::TempoUnreachable { .. })
        ));
    }

    #[test]
    fn test_coalescing_preserves_total_delay() {
        // Four blank rows at 20 Hz effective rate: every row extends the
        // reset frame's delay by the base delay instead of appending.
        let song = chip_song(subsong_with_rows(vec![
            blank_row(0),
            blank_row(1),
            blank_row(2),
            blank_row(3),
        ]));
        let lowered = lower_subsong(&song, 0).unwrap();
        assert_eq!(lowered.frames.len(), 2);

        let base = find_best_rate(20.0).unwrap().frame_delay;
        assert_eq!(lowered.frames[0].frame_delay, base * 4);
    }

    #[test]
    fn test_coalescing_stops_at_delay_cap() {
        // With a large base delay the previous frame's delay saturates and
        // fresh blank frames must be appended.
        let mut song = chip_song(subsong_with_rows(vec![
            blank_row(0),
            blank_row(1),
            blank_row(2),
        ]));
        song.subsongs[0].tick_rate = 0.5;
        song.subsongs[0].speeds = vec![1];
        let lowered = lower_subsong(&song, 0).unwrap();

        let base = find_best_rate(0.5).unwrap().frame_delay as u16;
        assert!(base > 128, "test premise: base delay is large");
        // The reset frame absorbs one row, then every further blank row
        // would overflow 255 and gets its own frame.
        assert_eq!(lowered.frames.len(), 4);
        let total: u32 = lowered
            .frames
            .iter()
            .map(|f| f.frame_delay as u32)
            .sum();
        assert_eq!(total, base as u32 * 3);
    }
}
