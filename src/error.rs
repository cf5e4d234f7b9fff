//! Errors reported by the VCO control core.
//!
//! None of these are fatal. The control loop absorbs them, reports a diagnostic, and keeps running.

use thiserror::Error;

use crate::tuning::Pass;

/// The crate wide error type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The note has no entry in the note lookup tables
    #[error("note {0} is outside the lookup tables")]
    NoteOutOfRange(u8),

    /// The self tuning process gave up
    #[error("tuning failed: {0}")]
    Tuning(#[from] TuningError),
}

/// Reasons a tuning pass can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TuningError {
    /// The pass ran out of evaluations without landing inside the tolerance window
    #[error("{pass} did not converge, last code {code} measured {count}")]
    NotConverged { pass: Pass, code: u16, count: u16 },

    /// The search wanted to step past the end of the DAC range
    #[error("{pass} calibration code left the DAC range")]
    CodeOutOfRange { pass: Pass },

    /// The pass reference note has no expected frequency
    #[error("{pass} reference note {note} is outside the lookup tables")]
    InvalidReference { pass: Pass, note: u8 },

    /// The meter never reported a measurement, the oscillator isn't running or isn't reaching the timer
    #[error("{pass} saw no oscillator edges")]
    NoSignal { pass: Pass },

    /// Two probe measurements gave the same frequency, nothing to interpolate
    #[error("{pass} probes measured the same frequency")]
    Degenerate { pass: Pass },
}
