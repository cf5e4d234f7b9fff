//! A simulated VCO board for exercising the control loop off target.
//!
//! The oscillator follows the usual exponential converter model:
//!
//! `f = 8Hz * 2^((offset - ideal_offset) / 400) * 2^(octaves * ideal_scale / scale)`
//!
//! where `octaves` is the CV in volts, 10 volts at full scale. The exponent slews towards its new value through a
//! single pole lowpass clocked by the oscillator edges, so measurements taken before the circuit settles are off.

use core::cell::{Cell, RefCell};

use biquad::*;
use heapless::Vec;

use crate::{
    hardware::{CvOutputs, DacChannel, FrequencyCounter},
    pitch_bend::DAC_MASK,
    tuning::TIMER_CLOCK_HZ,
};

/// Frequency of the lowest note with a CV of zero and perfect trims
const BASE_FREQ_HZ: f32 = 8.0;

/// Trim codes per octave of offset
const OFFSET_CODES_PER_OCTAVE: f32 = 400.0;

/// Full scale CV in octaves
const CV_FULL_SCALE_OCTAVES: f32 = 10.0;

const CV_LOG_LEN: usize = 64;

pub struct SimRig {
    cv: Cell<u16>,
    exp_scale: Cell<u16>,
    exp_offset: Cell<u16>,
    hard_sync: Cell<bool>,
    cv_log: RefCell<Vec<u16, CV_LOG_LEN>>,

    ideal_offset: f32,
    ideal_scale: f32,

    slew: RefCell<DirectForm1<f32>>,
    exponent: Cell<f32>,
}

impl SimRig {
    /// `SimRig::new(o, s)` is a rig whose oscillator is perfectly trimmed at offset code `o` and scale code `s`
    pub fn new(ideal_offset: u16, ideal_scale: u16) -> Self {
        // edges arrive at roughly 1kHz in the middle of the range
        let coeffs = Coefficients::<f32>::from_params(
            Type::SinglePoleLowPass,
            1000.0_f32.hz(),
            150.0_f32.hz(),
            0.0_f32,
        )
        .unwrap();

        Self {
            cv: Cell::new(0),
            exp_scale: Cell::new(0),
            exp_offset: Cell::new(0),
            hard_sync: Cell::new(false),
            cv_log: RefCell::new(Vec::new()),
            ideal_offset: ideal_offset as f32,
            ideal_scale: ideal_scale as f32,
            slew: RefCell::new(DirectForm1::<f32>::new(coeffs)),
            exponent: Cell::new(0.0),
        }
    }

    pub fn dac(&self, channel: DacChannel) -> u16 {
        match channel {
            DacChannel::Cv => self.cv.get(),
            DacChannel::ExpScale => self.exp_scale.get(),
            DacChannel::ExpOffset => self.exp_offset.get(),
        }
    }

    pub fn hard_sync(&self) -> bool {
        self.hard_sync.get()
    }

    /// `rig.cv_log()` is every CV code written since the log was last cleared, oldest first
    pub fn cv_log(&self) -> Vec<u16, CV_LOG_LEN> {
        self.cv_log.borrow().clone()
    }

    pub fn clear_cv_log(&self) {
        self.cv_log.borrow_mut().clear();
    }

    /// `rig.target_exponent()` is the octaves above the base frequency the oscillator is heading towards
    fn target_exponent(&self) -> f32 {
        let octaves = self.cv.get() as f32 * CV_FULL_SCALE_OCTAVES / DAC_MASK as f32;
        let scale = (self.exp_scale.get() as f32).max(1.0);

        (self.exp_offset.get() as f32 - self.ideal_offset) / OFFSET_CODES_PER_OCTAVE
            + octaves * self.ideal_scale / scale
    }

    /// `rig.edge()` advances the analog slew by one oscillator edge
    pub fn edge(&self) {
        let exponent = self.slew.borrow_mut().run(self.target_exponent());
        self.exponent.set(exponent);
    }

    /// `rig.frequency()` is the current oscillator frequency in hertz
    pub fn frequency(&self) -> f32 {
        BASE_FREQ_HZ * 2.0_f32.powf(self.exponent.get())
    }

    /// `rig.settled_frequency()` is the frequency the oscillator will settle at with the current DAC codes
    pub fn settled_frequency(&self) -> f32 {
        BASE_FREQ_HZ * 2.0_f32.powf(self.target_exponent())
    }

    /// `rig.period_count()` is one period of the oscillator in counter ticks
    pub fn period_count(&self) -> u16 {
        (TIMER_CLOCK_HZ as f32 / self.frequency()).min(u16::MAX as f32) as u16
    }
}

/// The DAC and hard sync side of the rig
pub struct SimOutputs<'a>(pub &'a SimRig);

impl<'a> CvOutputs for SimOutputs<'a> {
    fn write_dac(&mut self, channel: DacChannel, code: u16) {
        match channel {
            DacChannel::Cv => {
                self.0.cv.set(code);
                let _ = self.0.cv_log.borrow_mut().push(code);
            }
            DacChannel::ExpScale => self.0.exp_scale.set(code),
            DacChannel::ExpOffset => self.0.exp_offset.set(code),
        }
    }

    fn set_hard_sync(&mut self, asserted: bool) {
        self.0.hard_sync.set(asserted);
    }
}

/// The period counter side of the rig
pub struct SimCounter<'a>(pub &'a SimRig);

impl<'a> FrequencyCounter for SimCounter<'a> {
    fn start(&mut self) {}

    fn stop(&mut self) {}

    fn read_count(&mut self) -> u16 {
        self.0.period_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(rig: &SimRig) {
        for _ in 0..50 {
            rig.edge();
        }
    }

    #[test]
    fn perfect_trims_play_note_zero_at_eight_hertz() {
        let rig = SimRig::new(2000, 2100);
        let mut out = SimOutputs(&rig);
        out.write_dac(DacChannel::ExpOffset, 2000);
        out.write_dac(DacChannel::ExpScale, 2100);
        settle(&rig);

        assert!((rig.frequency() - 8.0).abs() < 0.01);
        assert_eq!(rig.period_count(), 31_250);
    }

    #[test]
    fn raising_the_offset_shortens_the_period() {
        let rig = SimRig::new(2000, 2100);
        let mut out = SimOutputs(&rig);
        out.write_dac(DacChannel::ExpScale, 2100);
        out.write_dac(DacChannel::ExpOffset, 2000);
        settle(&rig);
        let before = rig.period_count();

        out.write_dac(DacChannel::ExpOffset, 2010);
        settle(&rig);
        assert!(rig.period_count() < before);
    }

    #[test]
    fn raising_the_scale_lengthens_the_period() {
        let rig = SimRig::new(2000, 2100);
        let mut out = SimOutputs(&rig);
        out.write_dac(DacChannel::Cv, 2354);
        out.write_dac(DacChannel::ExpOffset, 2000);
        out.write_dac(DacChannel::ExpScale, 2100);
        settle(&rig);
        let before = rig.period_count();

        out.write_dac(DacChannel::ExpScale, 2110);
        settle(&rig);
        assert!(before < rig.period_count());
    }

    #[test]
    fn the_exponent_slews() {
        let rig = SimRig::new(2000, 2100);
        let mut out = SimOutputs(&rig);
        out.write_dac(DacChannel::ExpOffset, 2000);
        out.write_dac(DacChannel::ExpScale, 2100);
        out.write_dac(DacChannel::Cv, 4095);

        rig.edge();
        assert!(rig.frequency() < rig.settled_frequency() / 2.0);

        settle(&rig);
        assert!((rig.frequency() / rig.settled_frequency() - 1.0).abs() < 0.001);
    }
}
