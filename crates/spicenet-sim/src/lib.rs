//! Simulator boundary for Spicenet.
//!
//! Simulation itself is an external collaborator; this crate only
//! crosses the boundary: hand netlist text to a [`Simulator`], decode
//! the rawfile it writes.

pub mod error;
pub mod rawfile;
pub mod runner;

pub use error::{Error, Result};
pub use rawfile::{RawResults, parse_rawfile};
pub use runner::{Ngspice, NgspiceConfig, Simulator};
