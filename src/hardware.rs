//! # Hardware seams
//!
//! This crate has no direct connection to any peripheral. The board support code implements these traits on top of
//! whatever DACs, GPIO, and timers it has, and the control logic only ever talks to the traits. This lets the whole
//! control loop run on a desktop machine against simulated hardware.

/// The DAC channels the VCO drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DacChannel {
    /// The 1volt/octave pitch control voltage
    Cv,
    /// Trims the scale of the exponential converter
    ExpScale,
    /// Trims the frequency offset of the exponential converter
    ExpOffset,
}

/// The analog outputs of the VCO
pub trait CvOutputs {
    /// `out.write_dac(ch, c)` sets DAC channel `ch` to 12 bit code `c`
    fn write_dac(&mut self, channel: DacChannel, code: u16);

    /// `out.set_hard_sync(a)` asserts (`true`) or releases (`false`) the hard sync line
    ///
    /// While asserted the oscillator core is held in reset, which silences it without clicks.
    fn set_hard_sync(&mut self, asserted: bool);
}

/// A hardware period counter
///
/// The counter counts a known reference clock while running. Started on one oscillator edge and stopped on the next,
/// the count is the period of the oscillator in reference clock ticks.
pub trait FrequencyCounter {
    /// `fc.start()` clears the count and starts counting
    fn start(&mut self);

    /// `fc.stop()` stops counting, the count is held
    fn stop(&mut self);

    /// `fc.read_count()` is the held count
    fn read_count(&mut self) -> u16;
}
