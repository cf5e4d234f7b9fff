//! # Diagnostics
//!
//! Human readable records of what the VCO is doing. The scheduler keeps the most recent ones in a small ring for the
//! board code to drain and print over a debug UART, and mirrors each one to the `log` facade as it happens.

use core::fmt::{self, Write};

use heapless::String;
use log::Level;

use crate::{
    error::TuningError,
    tuning::{Calibration, Pass},
};

/// The longest rendered diagnostic line
pub const LINE_LEN: usize = 96;

/// A rendered diagnostic line
pub type DiagnosticLine = String<LINE_LEN>;

/// One diagnostic record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    NoteOn { note: u8, velocity: u8, dac: u16 },
    NoteOff { note: u8, velocity: u8 },
    PitchBend(i16),
    /// A Note-On with no entry in the note tables was ignored
    NoteRejected { note: u8 },
    TuneBegin,
    /// The tuner measured `count` and moved the trim code
    TuneNudge { pass: Pass, count: u16, up: bool },
    PassAccepted { pass: Pass, code: u16 },
    TuneFinished(Calibration),
    TuneFailed(TuningError),
}

impl Diagnostic {
    /// `d.level()` is the log level the record is mirrored at
    pub fn level(&self) -> Level {
        match self {
            Diagnostic::NoteOn { .. } | Diagnostic::NoteOff { .. } | Diagnostic::PitchBend(_) => Level::Debug,
            Diagnostic::TuneNudge { .. } => Level::Trace,
            Diagnostic::TuneBegin | Diagnostic::PassAccepted { .. } | Diagnostic::TuneFinished(_) => Level::Info,
            Diagnostic::NoteRejected { .. } | Diagnostic::TuneFailed(_) => Level::Warn,
        }
    }

    /// `d.line()` is the record rendered as a line of text terminated by `\r\n`
    ///
    /// # Examples
    ///
    /// ```
    /// use mcu_vco::diagnostics::Diagnostic;
    ///
    /// let d = Diagnostic::NoteOn { note: 60, velocity: 100, dac: 2047 };
    /// assert_eq!(d.line().unwrap(), "N = 60  V = 100 ON DAC = 2047\r\n");
    /// ```
    pub fn line(&self) -> Result<DiagnosticLine, fmt::Error> {
        let mut line = DiagnosticLine::new();
        write!(line, "{}\r\n", self)?;
        Ok(line)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::NoteOn {
                note,
                velocity,
                dac,
            } => write!(f, "N = {}  V = {} ON DAC = {}", note, velocity, dac),
            Diagnostic::NoteOff { note, velocity } => write!(f, "N = {}  V = {} OFF", note, velocity),
            Diagnostic::PitchBend(bend) => write!(f, "PB = {}", bend),
            Diagnostic::NoteRejected { note } => write!(f, "N = {} OUT OF RANGE", note),
            Diagnostic::TuneBegin => f.write_str("Beginning tune process..."),
            Diagnostic::TuneNudge { pass, count, up } => {
                write!(f, "   t = {}, {} {}", count, pass, if *up { "up" } else { "down" })
            }
            Diagnostic::PassAccepted { pass, code } => write!(f, "   {} OFFSET = {}", pass, code),
            Diagnostic::TuneFinished(cal) => write!(
                f,
                "Tuning done, offset {} scale {}",
                cal.exp_offset, cal.exp_scale
            ),
            Diagnostic::TuneFailed(err) => write!(f, "Tuning failed: {}", err),
        }
    }
}
