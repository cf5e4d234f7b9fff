//! Runtime settings for the VCO.

use crate::{pitch_bend::BendScale, tuning::TuningConfig};

/// Settings for the whole VCO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// The zero-based MIDI channel to listen to in `[0..15]`
    pub midi_channel: u8,

    /// How far pitch bend moves the CV
    pub bend_scale: BendScale,

    /// Whether to hold the oscillator in reset while no note is sounding
    pub hard_sync: bool,

    /// Self tuning settings, `None` for boards without the calibration DACs and period counter
    pub tuning: Option<TuningConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            midi_channel: 0,
            bend_scale: BendScale::default(),
            hard_sync: true,
            tuning: Some(TuningConfig::default()),
        }
    }
}
