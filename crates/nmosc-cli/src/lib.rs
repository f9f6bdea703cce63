//! Library surface of the `nmosc` binary.
//!
//! The interesting work lives in [`nmosc_furnace`] and [`nmosc_nmos`]; this
//! crate is the thin shell around them: input selection, log output, the
//! machine-readable report, and the compile command itself.

pub mod commands;
pub mod input;
pub mod report;
