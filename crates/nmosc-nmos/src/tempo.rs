//! Tempo register / frame delay search and channel period math.
//!
//! The Frame Clock runs at 31250 Hz divided by `tempo + 129`, and a frame is
//! held on air for `frame_delay + 1` Frame Clock cycles. The solver searches
//! for the `(tempo, frame_delay)` pair whose effective tick rate best
//! approximates a target rate.

use crate::frame::MAX_TEMPO;

/// Largest usable frame delay value during the search.
const MAX_FRAME_DELAY: u8 = 254;

/// Relative tolerance accepted between the target and achieved tick rate.
pub const MAX_RATE_ERROR: f64 = 0.01;

/// A `(tempo, frame_delay)` pair produced by [`find_best_rate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoFit {
    /// Tempo Register value (0-127).
    pub tempo: u8,
    /// Frame Delay value (0-254).
    pub frame_delay: u8,
    /// The tick rate this pair actually achieves, in Hz.
    pub achieved: f64,
    /// Relative error against the target rate.
    pub rel_error: f64,
}

/// Effective tick rate in Hz for a given Tempo Register value (0-127) and
/// Frame Delay (0-255).
pub fn effective_tick_rate(tempo: u8, frame_delay: u8) -> f64 {
    31250.0 / ((frame_delay as f64 + 1.0) * (tempo as f64 + 129.0))
}

/// The tempo (0-127) that best approximates `target_rate` for a fixed frame
/// delay, with the achieved rate and relative error.
fn best_tempo_for_delay(target_rate: f64, frame_delay: u8) -> (u8, f64, f64) {
    // Ideal real-valued tempo for this delay.
    let ideal = 31250.0 / ((frame_delay as f64 + 1.0) * target_rate) - 129.0;

    let mut best_tempo = 0u8;
    let mut best_achieved = 0.0;
    let mut best_err = f64::INFINITY;

    for candidate in [ideal.floor(), ideal.ceil()] {
        let tempo = candidate.clamp(0.0, MAX_TEMPO as f64) as u8;
        let achieved = effective_tick_rate(tempo, frame_delay);
        let rel_err = (achieved - target_rate).abs() / target_rate;
        if rel_err < best_err {
            best_err = rel_err;
            best_tempo = tempo;
            best_achieved = achieved;
        }
    }

    (best_tempo, best_achieved, best_err)
}

/// Search frame delay values in ascending order and return the smallest
/// delay for which some tempo lands within [`MAX_RATE_ERROR`] of
/// `target_rate`. Returns `None` when no combination meets the tolerance.
///
/// Searching ascending delays keeps the chosen delay as small as possible,
/// which minimises the ROM footprint per frame.
pub fn find_best_rate(target_rate: f64) -> Option<TempoFit> {
    for frame_delay in 0..=MAX_FRAME_DELAY {
        let (tempo, achieved, rel_error) = best_tempo_for_delay(target_rate, frame_delay);
        if rel_error <= MAX_RATE_ERROR {
            return Some(TempoFit {
                tempo,
                frame_delay,
                achieved,
                rel_error,
            });
        }
    }
    None
}

/// Rounded period of a square channel for a given frequency and chip clock.
///
/// # Examples
/// ```
/// use nmosc_nmos::tempo::square_period;
///
/// assert_eq!(square_period(440.0, 4_000_000.0), 284);
/// ```
pub fn square_period(freq: f64, clock_rate: f64) -> u16 {
    (clock_rate / (32.0 * freq)).round_ties_even() as u16
}

/// Rounded period of the noise channel for a given frequency and chip clock.
/// The noise shift register divides by 30 rather than 32.
pub fn noise_period(freq: f64, clock_rate: f64) -> u16 {
    (clock_rate / (30.0 * freq)).round_ties_even() as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_tick_rate_formula() {
        // tempo 121, delay 1: 31250 / (2 * 250) = 62.5
        assert!((effective_tick_rate(121, 1) - 62.5).abs() < 1e-9);
        // Fastest possible: tempo 0, delay 0.
        assert!((effective_tick_rate(0, 0) - 31250.0 / 129.0).abs() < 1e-9);
    }

    #[test]
    fn test_find_best_rate_satisfies_tolerance() {
        for target in [20.0, 50.0, 60.0, 128.0, 150.0, 242.2] {
            let fit = find_best_rate(target).expect("rate should be reachable");
            assert!(
                fit.rel_error <= MAX_RATE_ERROR,
                "target {}: rel error {} above tolerance",
                target,
                fit.rel_error
            );
            // The fit must be internally consistent with the formula.
            let recomputed = effective_tick_rate(fit.tempo, fit.frame_delay);
            assert!((recomputed - fit.achieved).abs() < 1e-9);
            assert!((fit.achieved - target).abs() / target <= MAX_RATE_ERROR);
        }
    }

    #[test]
    fn test_find_best_rate_prefers_small_delay() {
        // 60 Hz is reachable without any frame delay.
        let fit = find_best_rate(60.0).unwrap();
        assert_eq!(fit.frame_delay, 0);
    }

    #[test]
    fn test_find_best_rate_unreachable() {
        // Faster than the hardware maximum of 31250/129 ~ 242.25 Hz by far.
        assert!(find_best_rate(100_000.0).is_none());
        // Slower than the minimum of 31250/(255*256) ~ 0.479 Hz.
        assert!(find_best_rate(0.01).is_none());
    }

    #[test]
    fn test_square_period_reference_values() {
        assert_eq!(square_period(440.0, 4_000_000.0), 284);
        // One octave up halves the period.
        assert_eq!(square_period(880.0, 4_000_000.0), 142);
    }

    #[test]
    fn test_noise_period_uses_divisor_30() {
        assert_eq!(noise_period(440.0, 4_000_000.0), 303);
    }
}
