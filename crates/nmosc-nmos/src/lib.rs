//! NMOScillator song model and ROM image emitter.
//!
//! This crate holds the in-memory representation of a song as the
//! NMOScillator plays it (an ordered list of [`Frame`]s, each carrying up to
//! a dozen SN76489 commands) together with the numeric helpers for tempo
//! search and period calculation, and the binary emitter that turns a song
//! into the bit-exact ROM image the playback engine consumes.
//!
//! # Module Structure
//!
//! - [`command`]: SN76489 command variants and their wire encodings
//! - [`frame`]: a single playback frame with duplicate/range checking
//! - [`song`]: the song-level aggregate and its pretty-printer
//! - [`tempo`]: tempo register / frame delay search and period math
//! - [`emit`]: ROM serialisation
//!
//! The crate performs no I/O of its own beyond writing to caller-supplied
//! [`std::io::Write`] sinks.

pub mod command;
pub mod emit;
pub mod error;
pub mod frame;
pub mod song;
pub mod tempo;

pub use command::{Command, NoiseMode, NoiseRate};
pub use error::{EmitError, FrameError};
pub use frame::Frame;
pub use song::NmosSong;
pub use tempo::{
    effective_tick_rate, find_best_rate, noise_period, square_period, TempoFit, MAX_RATE_ERROR,
};
