//! SN76489 command variants and their wire encodings.
//!
//! Every chip command starts with a marker byte whose MSB is set; the full
//! layouts are described in the SN76489 application manual. Square period
//! commands are two bytes on the wire, everything else is one.

use std::fmt;

/// Operating mode of the noise channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseMode {
    /// Periodic ("pulsed") noise.
    Periodic,
    /// White noise.
    White,
}

/// Shift rate of the noise channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseRate {
    /// Fixed low rate.
    Low,
    /// Fixed medium rate.
    Medium,
    /// Fixed high rate.
    High,
    /// Noise rate tracks square channel 3's period.
    Channel3,
}

impl NoiseRate {
    /// Two-bit field value in the noise control byte.
    fn bits(self) -> u8 {
        match self {
            NoiseRate::High => 0,
            NoiseRate::Medium => 1,
            NoiseRate::Low => 2,
            NoiseRate::Channel3 => 3,
        }
    }
}

/// A single SN76489 command.
///
/// The variants carry exactly the fields that command kind needs, so an
/// attenuation value can never be attached to a period command and the noise
/// control can never name a channel other than the noise channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Set the 10-bit period of a square channel (0-2).
    SetSquarePeriod { channel: u8, period: u16 },
    /// Set the 4-bit attenuation of any channel (0-3). Attenuation is the
    /// inverse of volume: 0xf is silent, 0x0 is full volume.
    SetAttenuation { channel: u8, attenuation: u8 },
    /// Configure the noise channel (implicitly channel 3).
    SetNoiseControl { mode: NoiseMode, rate: NoiseRate },
}

impl Command {
    /// Number of bytes this command occupies in the ROM.
    pub fn wire_len(&self) -> usize {
        match self {
            Command::SetSquarePeriod { .. } => 2,
            Command::SetAttenuation { .. } | Command::SetNoiseControl { .. } => 1,
        }
    }

    /// The channel this command addresses (3 for noise control).
    pub fn channel(&self) -> u8 {
        match self {
            Command::SetSquarePeriod { channel, .. } => *channel,
            Command::SetAttenuation { channel, .. } => *channel,
            Command::SetNoiseControl { .. } => 3,
        }
    }

    /// Whether two commands occupy the same `(kind, channel)` slot of a
    /// frame. A frame accepts at most one command per slot.
    pub(crate) fn same_slot(&self, other: &Command) -> bool {
        match (self, other) {
            (
                Command::SetSquarePeriod { channel: a, .. },
                Command::SetSquarePeriod { channel: b, .. },
            ) => a == b,
            (
                Command::SetAttenuation { channel: a, .. },
                Command::SetAttenuation { channel: b, .. },
            ) => a == b,
            // Noise control always addresses the noise channel.
            (Command::SetNoiseControl { .. }, Command::SetNoiseControl { .. }) => true,
            _ => false,
        }
    }

    /// Encode the command into the bytes written to ROM.
    pub fn wire_bytes(&self) -> Vec<u8> {
        match *self {
            Command::SetSquarePeriod { channel, period } => {
                // Marker byte: channel in bits 6-5, low nibble of the period
                // in bits 3-0. Second byte carries the upper six period bits.
                let b0 = 0x80 | ((channel & 0b111) << 5) | (period & 0x0f) as u8;
                let b1 = ((period >> 4) & 0x3f) as u8;
                vec![b0, b1]
            }
            Command::SetAttenuation {
                channel,
                attenuation,
            } => {
                // Bit 4 selects the attenuation register.
                vec![0x90 | ((channel & 0b111) << 5) | (attenuation & 0x0f)]
            }
            Command::SetNoiseControl { mode, rate } => {
                let mode_bit = match mode {
                    NoiseMode::Periodic => 0,
                    NoiseMode::White => 1,
                };
                vec![0x80 | (3 << 5) | (mode_bit << 2) | rate.bits()]
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetSquarePeriod { period, .. } => write!(f, "Set period to {}", period),
            Command::SetAttenuation { attenuation, .. } => {
                write!(f, "Set atten. to {}", attenuation)
            }
            Command::SetNoiseControl { mode, rate } => {
                let mode = match mode {
                    NoiseMode::White => "white",
                    NoiseMode::Periodic => "pulse",
                };
                let rate = match rate {
                    NoiseRate::Low => "low",
                    NoiseRate::Medium => "med",
                    NoiseRate::High => "high",
                    NoiseRate::Channel3 => "ch3",
                };
                write!(f, "Mode: {} {}", mode, rate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_period_encoding() {
        let cmd = Command::SetSquarePeriod {
            channel: 1,
            period: 284,
        };
        // 284 = 0b01_0001_1100: low nibble 0xc, upper bits 0b010001.
        assert_eq!(cmd.wire_bytes(), vec![0x80 | (1 << 5) | 0x0c, 0b010001]);
        assert_eq!(cmd.wire_len(), 2);
    }

    #[test]
    fn test_attenuation_encoding() {
        let cmd = Command::SetAttenuation {
            channel: 3,
            attenuation: 0xf,
        };
        assert_eq!(cmd.wire_bytes(), vec![0x90 | (3 << 5) | 0x0f]);
        assert_eq!(cmd.wire_len(), 1);
    }

    #[test]
    fn test_noise_control_encoding() {
        let cmd = Command::SetNoiseControl {
            mode: NoiseMode::White,
            rate: NoiseRate::Channel3,
        };
        // 1110_0111: channel 3 marker, white noise, rate field 3.
        assert_eq!(cmd.wire_bytes(), vec![0b1110_0111]);

        let cmd = Command::SetNoiseControl {
            mode: NoiseMode::Periodic,
            rate: NoiseRate::High,
        };
        assert_eq!(cmd.wire_bytes(), vec![0b1110_0000]);
    }

    #[test]
    fn test_same_slot() {
        let p0 = Command::SetSquarePeriod {
            channel: 0,
            period: 100,
        };
        let p0b = Command::SetSquarePeriod {
            channel: 0,
            period: 200,
        };
        let p1 = Command::SetSquarePeriod {
            channel: 1,
            period: 100,
        };
        let a0 = Command::SetAttenuation {
            channel: 0,
            attenuation: 4,
        };
        assert!(p0.same_slot(&p0b));
        assert!(!p0.same_slot(&p1));
        assert!(!p0.same_slot(&a0));
    }
}
