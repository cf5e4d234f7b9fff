//! # Period meter
//!
//! The interrupt-side half of the self tuning process. A timer interrupt fires on every rising edge of the
//! oscillator. After the tuner changes a calibration voltage the first few edges are discarded while the analog
//! circuitry settles, then the hardware counter is started on one edge and stopped on the next, which latches one
//! period of the oscillator.
//!
//! The tuner in the main loop never touches the counter directly. It asks for a measurement with `arm()` and waits
//! for the meter to report back with `MeterEvent`s.

use crate::hardware::FrequencyCounter;

/// The default number of oscillator edges to discard after the stimulus changes
pub const SETTLE_PULSES: u8 = 5;

/// Progress reports from the meter to the tuner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterEvent {
    /// Settling finished and the counter is running
    Settled,
    /// A measurement finished, the count is the oscillator period in counter ticks
    Captured(u16),
}

/// Requests from the tuner to the meter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterCommand {
    /// Start a fresh settle-then-measure cycle
    Arm,
}

/// The main loop side view of a period meter
pub trait MeterLink {
    /// `ml.arm()` requests a new measurement, restarting any measurement in progress
    fn arm(&mut self);

    /// `ml.poll_event()` is the next progress report from the meter, if any
    fn poll_event(&mut self) -> Option<MeterEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Settling,
    Measuring,
}

/// An edge driven period meter is represented here.
pub struct PeriodMeter<C: FrequencyCounter> {
    counter: C,
    settle_pulses: u8,
    num_ignored: u8,
    state: State,
}

impl<C: FrequencyCounter> PeriodMeter<C> {
    /// `PeriodMeter::new(c, n)` is a new idle meter using counter `c` which discards `n` edges before measuring
    pub fn new(counter: C, settle_pulses: u8) -> Self {
        Self {
            counter,
            settle_pulses,
            num_ignored: 0,
            state: State::Idle,
        }
    }

    /// `pm.arm()` stops the counter and starts a fresh settle-then-measure cycle
    pub fn arm(&mut self) {
        self.counter.stop();
        self.num_ignored = 0;
        self.state = State::Settling;
    }

    /// `pm.on_edge()` advances the meter by one oscillator edge, must be called from the edge interrupt
    ///
    /// # Returns
    ///
    /// * `Some(event)` if the meter made progress worth reporting to the tuner
    pub fn on_edge(&mut self) -> Option<MeterEvent> {
        match self.state {
            State::Idle => None,
            State::Settling if self.num_ignored < self.settle_pulses => {
                self.num_ignored += 1;
                None
            }
            State::Settling => {
                self.counter.start();
                self.state = State::Measuring;
                Some(MeterEvent::Settled)
            }
            State::Measuring => {
                self.counter.stop();
                self.state = State::Idle;
                Some(MeterEvent::Captured(self.counter.read_count()))
            }
        }
    }

    /// `pm.is_idle()` is true iff no measurement is in progress
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// `pm.counter()` is the underlying counter
    pub fn counter(&self) -> &C {
        &self.counter
    }
}
