//! # Self tuning controller
//!
//! Analog exponential converters drift with temperature and from part to part, so the VCO tunes itself at power up.
//! Two trim voltages are calibrated, one after the other:
//!
//! - the frequency offset, so that a CV of zero plays the lowest note at the right pitch
//! - the scale, so that A4 (note 69) plays at 440 Hz
//!
//! Each calibration pass is a small state machine:
//!
//! `StimulusApplied -> Settling -> Measuring -> Evaluate -> (StimulusApplied | next pass | Idle)`
//!
//! The tuner writes a known CV and the trim code under test, asks the period meter for a measurement, and compares
//! the measured period with the period expected for the reference note. If it is off, the trim code is nudged and
//! the pass is repeated. The oscillator responds monotonically to the trim voltages over their whole range, so the
//! search walks straight towards the target.
//!
//! The search strategy is pluggable. `UnitStep` walks one code at a time from the configured starting code.
//! `TwoPoint` first measures either side of the starting code and interpolates a guess, then walks one code at a
//! time.
//!
//! Every pass is bounded by a maximum number of evaluations. A pass that can't land inside its tolerance window
//! fails with a `TuningError` instead of searching forever. Waiting for the meter is bounded too, an oscillator
//! which never produces an edge fails with `TuningError::NoSignal`.

use core::fmt;

use heapless::Vec;

use crate::{
    error::TuningError,
    hardware::{CvOutputs, DacChannel},
    lookup_tables::{note_to_dac, note_to_freq},
    period_meter::{MeterEvent, MeterLink, SETTLE_PULSES},
    pitch_bend::DAC_MASK,
};

/// The period counter reference clock, 16MHz SMCLK divided by 64
pub const TIMER_CLOCK_HZ: u32 = 250_000;

/// The default trim code for both passes, half of the DAC range
pub const INITIAL_TRIM_CODE: u16 = 2048;

/// The default limit of measurements in one pass
pub const MAX_EVALUATIONS: u16 = 1024;

/// The default limit of `Tuner::service()` calls spent waiting for one measurement
pub const MAX_WAITS: u32 = 500_000;

/// The calibration passes, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Trims the exponential converter frequency offset
    Offset,
    /// Trims the exponential converter scale
    Scale,
}

impl Pass {
    /// `p.next()` is the pass which runs after `p`, if any
    pub fn next(&self) -> Option<Pass> {
        match self {
            Pass::Offset => Some(Pass::Scale),
            Pass::Scale => None,
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pass::Offset => f.write_str("EXP FREQ"),
            Pass::Scale => f.write_str("EXP SCALE"),
        }
    }
}

/// How the measured period responds when the trim code goes up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slope {
    /// Higher codes measure longer periods
    Rising,
    /// Higher codes measure shorter periods
    Falling,
}

/// The stages of a calibration pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningStage {
    Idle,
    StimulusApplied,
    Settling,
    Measuring,
    Evaluate,
}

/// Settings for one calibration pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassConfig {
    /// The DAC channel holding the trim code
    pub channel: DacChannel,
    /// The first trim code to try
    pub initial_code: u16,
    /// The CV is set to this note while measuring, its expected frequency is the target
    pub reference_note: u8,
    /// Accepted distance from the target, in counter ticks
    pub tolerance: u16,
    pub slope: Slope,
}

/// Settings for the whole tuning process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuningConfig {
    /// Frequency of the period counter reference clock
    pub timer_clock_hz: u32,
    /// Oscillator edges to discard after each stimulus change
    pub settle_pulses: u8,
    /// Measurements allowed per pass before giving up
    pub max_evaluations: u16,
    /// Service calls allowed waiting for one measurement before giving up, scale with the main loop speed
    pub max_waits: u32,
    pub offset: PassConfig,
    pub scale: PassConfig,
}

impl TuningConfig {
    /// `tc.pass(p)` is the settings for pass `p`
    pub fn pass(&self, pass: Pass) -> &PassConfig {
        match pass {
            Pass::Offset => &self.offset,
            Pass::Scale => &self.scale,
        }
    }
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            timer_clock_hz: TIMER_CLOCK_HZ,
            settle_pulses: SETTLE_PULSES,
            max_evaluations: MAX_EVALUATIONS,
            max_waits: MAX_WAITS,
            // a higher offset voltage raises the pitch, shortening the period
            offset: PassConfig {
                channel: DacChannel::ExpOffset,
                initial_code: INITIAL_TRIM_CODE,
                reference_note: 0,
                tolerance: 64,
                slope: Slope::Falling,
            },
            // a higher scale voltage shrinks the volts/octave gain, lengthening the period
            scale: PassConfig {
                channel: DacChannel::ExpScale,
                initial_code: INITIAL_TRIM_CODE,
                reference_note: 69,
                tolerance: 2,
                slope: Slope::Rising,
            },
        }
    }
}

/// The trim codes found by tuning, held on their DAC channels for the rest of runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub exp_offset: u16,
    pub exp_scale: u16,
}

impl Calibration {
    /// `cal.code(p)` is the trim code for pass `p`
    pub fn code(&self, pass: Pass) -> u16 {
        match pass {
            Pass::Offset => self.exp_offset,
            Pass::Scale => self.exp_scale,
        }
    }

    fn set(&mut self, pass: Pass, code: u16) {
        match pass {
            Pass::Offset => self.exp_offset = code,
            Pass::Scale => self.exp_scale = code,
        }
    }
}

impl From<&TuningConfig> for Calibration {
    /// The untuned calibration, each pass at its starting code
    fn from(config: &TuningConfig) -> Self {
        Self {
            exp_offset: config.offset.initial_code,
            exp_scale: config.scale.initial_code,
        }
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::from(&TuningConfig::default())
    }
}

/// Everything a strategy needs to know about the pass in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassPlan {
    pub pass: Pass,
    pub config: PassConfig,
    /// The expected period of the reference note, in counter ticks
    pub target: u16,
    /// The CV DAC code of the reference note
    pub cv_code: u16,
}

impl PassPlan {
    /// `PassPlan::new(p, tc)` is the plan for pass `p` with tuning settings `tc`
    pub fn new(pass: Pass, tuning: &TuningConfig) -> Result<Self, TuningError> {
        let config = *tuning.pass(pass);
        let note = config.reference_note;
        let invalid = |_| TuningError::InvalidReference { pass, note };

        let freq = note_to_freq(note).map_err(invalid)?;
        let cv_code = note_to_dac(note).map_err(invalid)?;
        let target = (tuning.timer_clock_hz / freq as u32).min(u16::MAX as u32) as u16;

        Ok(Self {
            pass,
            config,
            target,
            cv_code,
        })
    }

    /// `pp.is_within_tolerance(c)` is true iff count `c` is inside the tolerance window around the target
    ///
    /// The window is inclusive at both edges, a count exactly `tolerance` away from the target is accepted.
    pub fn is_within_tolerance(&self, count: u16) -> bool {
        count.abs_diff(self.target) <= self.config.tolerance
    }

    /// `pp.nudge(code, count)` is trim code `code` moved by one towards the target, given it measured `count`
    pub fn nudge(&self, code: u16, count: u16) -> Result<u16, TuningError> {
        let count_too_long = self.target < count;
        let step_up = match self.config.slope {
            Slope::Rising => !count_too_long,
            Slope::Falling => count_too_long,
        };

        let next = if step_up {
            code.checked_add(1)
        } else {
            code.checked_sub(1)
        };

        next.filter(|c| *c <= DAC_MASK)
            .ok_or(TuningError::CodeOutOfRange { pass: self.pass })
    }
}

/// The outcome of judging one measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The code is good, the pass is done
    Accept,
    /// Measure again with this code
    Retry(u16),
}

/// A way of searching for the right trim code
pub trait TuningStrategy {
    /// `ts.begin(pp)` resets the strategy for a new pass with plan `pp` and is the first code to measure
    fn begin(&mut self, plan: &PassPlan) -> u16;

    /// `ts.evaluate(pp, code, count)` judges the measurement `count` taken with trim code `code`
    fn evaluate(&mut self, plan: &PassPlan, code: u16, count: u16) -> Result<Verdict, TuningError>;
}

/// Walk one code at a time from the configured starting code
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitStep;

impl TuningStrategy for UnitStep {
    fn begin(&mut self, plan: &PassPlan) -> u16 {
        plan.config.initial_code
    }

    fn evaluate(&mut self, plan: &PassPlan, code: u16, count: u16) -> Result<Verdict, TuningError> {
        if plan.is_within_tolerance(count) {
            Ok(Verdict::Accept)
        } else {
            plan.nudge(code, count).map(Verdict::Retry)
        }
    }
}

/// Measure either side of the starting code, interpolate a guess, then walk one code at a time
#[derive(Debug, Clone)]
pub struct TwoPoint {
    // distance of the probes from the starting code
    spread: u16,

    high_probe: u16,
    probes: Vec<(u16, u16), 2>,
    refining: bool,
}

impl TwoPoint {
    /// `TwoPoint::new(s)` is a two point strategy which probes `s` codes below and above the starting code
    ///
    /// Keep the spread small enough that both probes measure a period the counter can hold.
    pub fn new(spread: u16) -> Self {
        Self {
            spread,
            high_probe: 0,
            probes: Vec::new(),
            refining: false,
        }
    }

    /// `tp.interpolate(pp)` is the trim code expected to hit the target, linear in frequency between the probes
    fn interpolate(&self, plan: &PassPlan) -> Result<u16, TuningError> {
        // frequency is proportional to the reciprocal of the period count
        let freq = |count: u16| FREQ_SCALE / count.max(1) as i64;

        let (c1, f1) = (self.probes[0].0 as i64, freq(self.probes[0].1));
        let (c2, f2) = (self.probes[1].0 as i64, freq(self.probes[1].1));
        let ft = freq(plan.target);

        if f1 == f2 {
            return Err(TuningError::Degenerate { pass: plan.pass });
        }

        let code = c1 + (ft - f1) * (c2 - c1) / (f2 - f1);
        Ok(code.clamp(0, DAC_MASK as i64) as u16)
    }
}

impl Default for TwoPoint {
    /// Probes 256 codes either side, a little over half an octave of offset
    fn default() -> Self {
        Self::new(256)
    }
}

impl TuningStrategy for TwoPoint {
    fn begin(&mut self, plan: &PassPlan) -> u16 {
        let start = plan.config.initial_code;
        self.high_probe = start.saturating_add(self.spread).min(DAC_MASK);
        self.probes.clear();
        self.refining = false;
        start.saturating_sub(self.spread)
    }

    fn evaluate(&mut self, plan: &PassPlan, code: u16, count: u16) -> Result<Verdict, TuningError> {
        if plan.is_within_tolerance(count) {
            return Ok(Verdict::Accept);
        }

        if self.refining {
            return plan.nudge(code, count).map(Verdict::Retry);
        }

        // can't overflow, we stop probing once there are two
        self.probes.push((code, count)).ok();

        if self.probes.len() < 2 {
            Ok(Verdict::Retry(self.high_probe))
        } else {
            self.refining = true;
            self.interpolate(plan).map(Verdict::Retry)
        }
    }
}

/// Fixed point scale for reciprocal frequency math
const FREQ_SCALE: i64 = 1 << 32;

/// Things the tuner did during one service call, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerEvent {
    /// Nothing to do yet, waiting on the period meter
    Waiting,
    /// The stimulus was written and a measurement requested
    StimulusApplied { pass: Pass, code: u16 },
    /// The meter finished settling
    Settled,
    /// A period was latched
    Captured { count: u16 },
    /// The measurement was off, trying the next code
    Nudged {
        pass: Pass,
        count: u16,
        from: u16,
        to: u16,
    },
    /// The pass found its code
    Accepted { pass: Pass, code: u16 },
}

/// The self tuning controller is represented here.
///
/// It is driven from the main loop, one stage per call to `service()`.
pub struct Tuner<S: TuningStrategy> {
    config: TuningConfig,
    strategy: S,
    calibration: Calibration,

    plan: PassPlan,
    stage: TuningStage,

    // the trim code under test
    code: u16,

    // the latest latched period count
    count: u16,

    // measurements judged in the current pass
    evaluations: u16,

    // service calls spent waiting on the meter since the last stimulus
    waits: u32,
}

impl<S: TuningStrategy> Tuner<S> {
    /// `Tuner::new(tc, s, cal)` is a new tuner ready to begin the offset pass
    ///
    /// # Arguments
    ///
    /// * `config` - the tuning settings
    ///
    /// * `strategy` - how to search for trim codes
    ///
    /// * `calibration` - the trim codes currently on the DAC, a pass keeps its old code until it is accepted
    pub fn new(config: TuningConfig, strategy: S, calibration: Calibration) -> Result<Self, TuningError> {
        let plan = PassPlan::new(Pass::Offset, &config)?;

        let mut tuner = Self {
            config,
            strategy,
            calibration,
            plan,
            stage: TuningStage::Idle,
            code: 0,
            count: 0,
            evaluations: 0,
            waits: 0,
        };
        tuner.begin_pass(plan);

        Ok(tuner)
    }

    /// `t.restart(cal)` abandons any tuning in progress and begins the offset pass again from calibration `cal`
    pub fn restart(&mut self, calibration: Calibration) -> Result<(), TuningError> {
        let plan = PassPlan::new(Pass::Offset, &self.config)?;
        self.calibration = calibration;
        self.begin_pass(plan);
        Ok(())
    }

    fn begin_pass(&mut self, plan: PassPlan) {
        self.plan = plan;
        self.code = self.strategy.begin(&plan);
        self.evaluations = 0;
        self.stage = TuningStage::StimulusApplied;
    }

    /// `t.service(out, link)` advances the tuner by at most one stage
    ///
    /// Any error ends the tuning process, the tuner goes idle and keeps the codes accepted so far.
    pub fn service<O: CvOutputs, L: MeterLink>(
        &mut self,
        out: &mut O,
        link: &mut L,
    ) -> Result<TunerEvent, TuningError> {
        let res = self.step(out, link);
        if res.is_err() {
            self.stage = TuningStage::Idle;
        }
        res
    }

    fn step<O: CvOutputs, L: MeterLink>(
        &mut self,
        out: &mut O,
        link: &mut L,
    ) -> Result<TunerEvent, TuningError> {
        match self.stage {
            TuningStage::Idle => Ok(TunerEvent::Waiting),

            TuningStage::StimulusApplied => {
                out.write_dac(DacChannel::Cv, self.plan.cv_code);
                out.write_dac(self.plan.config.channel, self.code);
                link.arm();
                self.waits = 0;
                self.stage = TuningStage::Settling;
                Ok(TunerEvent::StimulusApplied {
                    pass: self.plan.pass,
                    code: self.code,
                })
            }

            TuningStage::Settling => match link.poll_event() {
                Some(MeterEvent::Settled) => {
                    self.stage = TuningStage::Measuring;
                    Ok(TunerEvent::Settled)
                }
                // a capture before settling belongs to an earlier stimulus
                Some(MeterEvent::Captured(_)) | None => self.wait(),
            },

            TuningStage::Measuring => match link.poll_event() {
                Some(MeterEvent::Captured(count)) => Ok(self.latch(count)),
                Some(MeterEvent::Settled) | None => self.wait(),
            },

            TuningStage::Evaluate => self.evaluate(),
        }
    }

    fn wait(&mut self) -> Result<TunerEvent, TuningError> {
        self.waits += 1;
        if self.config.max_waits < self.waits {
            return Err(TuningError::NoSignal {
                pass: self.plan.pass,
            });
        }
        Ok(TunerEvent::Waiting)
    }

    fn latch(&mut self, count: u16) -> TunerEvent {
        self.count = count;
        self.stage = TuningStage::Evaluate;
        TunerEvent::Captured { count }
    }

    fn evaluate(&mut self) -> Result<TunerEvent, TuningError> {
        let pass = self.plan.pass;
        self.evaluations += 1;

        match self.strategy.evaluate(&self.plan, self.code, self.count)? {
            Verdict::Accept => {
                let code = self.code;
                self.calibration.set(pass, code);
                match pass.next() {
                    Some(next) => self.begin_pass(PassPlan::new(next, &self.config)?),
                    None => self.stage = TuningStage::Idle,
                }
                Ok(TunerEvent::Accepted { pass, code })
            }
            Verdict::Retry(_) if self.config.max_evaluations <= self.evaluations => {
                Err(TuningError::NotConverged {
                    pass,
                    code: self.code,
                    count: self.count,
                })
            }
            Verdict::Retry(code) => {
                let from = self.code;
                self.code = code;
                self.stage = TuningStage::StimulusApplied;
                Ok(TunerEvent::Nudged {
                    pass,
                    count: self.count,
                    from,
                    to: code,
                })
            }
        }
    }

    /// `t.stage()` is the stage of the pass in progress, `Idle` once tuning has ended
    pub fn stage(&self) -> TuningStage {
        self.stage
    }

    /// `t.pass()` is the pass in progress, or the last pass if tuning has ended
    pub fn pass(&self) -> Pass {
        self.plan.pass
    }

    /// `t.plan()` is the plan of the pass in progress
    pub fn plan(&self) -> &PassPlan {
        &self.plan
    }

    /// `t.code()` is the trim code under test
    pub fn code(&self) -> u16 {
        self.code
    }

    /// `t.last_count()` is the most recently latched period count
    pub fn last_count(&self) -> u16 {
        self.count
    }

    /// `t.evaluations()` is the number of measurements judged so far in the current pass
    pub fn evaluations(&self) -> u16 {
        self.evaluations
    }

    /// `t.calibration()` is the accepted trim codes so far
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// `t.is_finished()` is true iff tuning has ended, successfully or not
    pub fn is_finished(&self) -> bool {
        self.stage == TuningStage::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    /// A stand in for the VCO plus period meter, measuring whatever `model` says the writes should produce
    struct Bench {
        cv: Cell<u16>,
        scale: Cell<u16>,
        offset: Cell<u16>,
        armed: Cell<bool>,
        settled: Cell<bool>,
        arms: Cell<u32>,
        model: fn(u16, u16, u16) -> u16,
    }

    impl Bench {
        fn new(model: fn(u16, u16, u16) -> u16) -> Self {
            Self {
                cv: Cell::new(0),
                scale: Cell::new(0),
                offset: Cell::new(0),
                armed: Cell::new(false),
                settled: Cell::new(false),
                arms: Cell::new(0),
                model,
            }
        }
    }

    impl CvOutputs for &Bench {
        fn write_dac(&mut self, channel: DacChannel, code: u16) {
            match channel {
                DacChannel::Cv => self.cv.set(code),
                DacChannel::ExpScale => self.scale.set(code),
                DacChannel::ExpOffset => self.offset.set(code),
            }
        }

        fn set_hard_sync(&mut self, _asserted: bool) {}
    }

    impl MeterLink for &Bench {
        fn arm(&mut self) {
            self.armed.set(true);
            self.settled.set(false);
            self.arms.set(self.arms.get() + 1);
        }

        fn poll_event(&mut self) -> Option<MeterEvent> {
            if !self.armed.get() {
                None
            } else if !self.settled.get() {
                self.settled.set(true);
                Some(MeterEvent::Settled)
            } else {
                self.armed.set(false);
                Some(MeterEvent::Captured((self.model)(
                    self.cv.get(),
                    self.scale.get(),
                    self.offset.get(),
                )))
            }
        }
    }

    /// offset lands at 2000, scale lands at 2100
    fn linear_vco(cv: u16, scale: u16, offset: u16) -> u16 {
        if cv == 0 {
            (31_250 + (2000 - offset as i32) * 10) as u16
        } else {
            (568 + (scale as i32 - 2100)) as u16
        }
    }

    fn run<S: TuningStrategy>(tuner: &mut Tuner<S>, bench: &Bench) -> Result<(), TuningError> {
        let (mut out, mut link) = (bench, bench);
        for _ in 0..100_000 {
            tuner.service(&mut out, &mut link)?;
            if tuner.is_finished() {
                return Ok(());
            }
        }
        panic!("tuner never finished");
    }

    #[test]
    fn default_targets_come_from_the_reference_notes() {
        let config = TuningConfig::default();
        assert_eq!(PassPlan::new(Pass::Offset, &config).unwrap().target, 31_250);
        assert_eq!(PassPlan::new(Pass::Scale, &config).unwrap().target, 568);
        assert_eq!(PassPlan::new(Pass::Scale, &config).unwrap().cv_code, 2354);
    }

    #[test]
    fn invalid_reference_note_is_rejected() {
        let mut config = TuningConfig::default();
        config.offset.reference_note = 121;
        assert_eq!(
            Tuner::new(config, UnitStep, Calibration::default()).err(),
            Some(TuningError::InvalidReference {
                pass: Pass::Offset,
                note: 121
            })
        );
    }

    #[test]
    fn stages_run_in_order() {
        let bench = Bench::new(linear_vco);
        let (mut out, mut link) = (&bench, &bench);
        let mut tuner = Tuner::new(TuningConfig::default(), UnitStep, Calibration::default()).unwrap();

        assert_eq!(tuner.stage(), TuningStage::StimulusApplied);
        assert_eq!(
            tuner.service(&mut out, &mut link),
            Ok(TunerEvent::StimulusApplied {
                pass: Pass::Offset,
                code: 2048
            })
        );
        assert_eq!(bench.offset.get(), 2048);
        assert_eq!(bench.cv.get(), 0);

        assert_eq!(tuner.stage(), TuningStage::Settling);
        assert_eq!(tuner.service(&mut out, &mut link), Ok(TunerEvent::Settled));
        assert_eq!(tuner.stage(), TuningStage::Measuring);
        assert_eq!(
            tuner.service(&mut out, &mut link),
            Ok(TunerEvent::Captured { count: 30_770 })
        );
        assert_eq!(tuner.stage(), TuningStage::Evaluate);

        // period too short, the offset pass has a falling slope so the code goes down
        assert_eq!(
            tuner.service(&mut out, &mut link),
            Ok(TunerEvent::Nudged {
                pass: Pass::Offset,
                count: 30_770,
                from: 2048,
                to: 2047
            })
        );
        assert_eq!(tuner.stage(), TuningStage::StimulusApplied);
    }

    #[test]
    fn waits_while_the_meter_is_busy() {
        let bench = Bench::new(linear_vco);
        let (mut out, mut link) = (&bench, &bench);
        let mut tuner = Tuner::new(TuningConfig::default(), UnitStep, Calibration::default()).unwrap();

        tuner.service(&mut out, &mut link).unwrap();
        bench.armed.set(false);

        for _ in 0..10 {
            assert_eq!(tuner.service(&mut out, &mut link), Ok(TunerEvent::Waiting));
            assert_eq!(tuner.stage(), TuningStage::Settling);
        }
    }

    #[test]
    fn gives_up_when_the_meter_never_reports() {
        let bench = Bench::new(linear_vco);
        let (mut out, mut link) = (&bench, &bench);
        let mut config = TuningConfig::default();
        config.max_waits = 50;
        let mut tuner = Tuner::new(config, UnitStep, Calibration::default()).unwrap();

        tuner.service(&mut out, &mut link).unwrap();
        bench.armed.set(false);

        for _ in 0..50 {
            assert_eq!(tuner.service(&mut out, &mut link), Ok(TunerEvent::Waiting));
        }
        assert_eq!(
            tuner.service(&mut out, &mut link),
            Err(TuningError::NoSignal { pass: Pass::Offset })
        );
        assert!(tuner.is_finished());
        assert_eq!(tuner.calibration(), Calibration::default());
    }

    #[test]
    fn a_capture_before_settling_is_stale() {
        let bench = Bench::new(linear_vco);
        let (mut out, mut link) = (&bench, &bench);
        let mut tuner = Tuner::new(TuningConfig::default(), UnitStep, Calibration::default()).unwrap();
        tuner.service(&mut out, &mut link).unwrap();

        // the meter finishes a cycle started before this stimulus
        bench.settled.set(true);
        assert_eq!(tuner.service(&mut out, &mut link), Ok(TunerEvent::Waiting));
        assert_eq!(tuner.stage(), TuningStage::Settling);

        bench.armed.set(true);
        bench.settled.set(false);
        assert_eq!(tuner.service(&mut out, &mut link), Ok(TunerEvent::Settled));
        assert_eq!(
            tuner.service(&mut out, &mut link),
            Ok(TunerEvent::Captured { count: 30_770 })
        );
    }

    #[test]
    fn tolerance_window_includes_its_edges() {
        let plan = PassPlan::new(Pass::Scale, &TuningConfig::default()).unwrap();
        assert_eq!((plan.target, plan.config.tolerance), (568, 2));

        assert!(plan.is_within_tolerance(570));
        assert!(plan.is_within_tolerance(566));
        assert!(!plan.is_within_tolerance(571));
        assert!(!plan.is_within_tolerance(565));
    }

    #[test]
    fn unit_step_converges_within_the_initial_error() {
        let bench = Bench::new(linear_vco);
        let mut tuner = Tuner::new(TuningConfig::default(), UnitStep, Calibration::default()).unwrap();

        // watch the offset pass on its own
        let (mut out, mut link) = (&bench, &bench);
        while tuner.pass() == Pass::Offset {
            tuner.service(&mut out, &mut link).unwrap();
        }
        let offset = tuner.calibration().exp_offset;
        assert_eq!(offset, 2006);
        assert_eq!(bench.arms.get(), (2048 - 2006) + 1);

        run(&mut tuner, &bench).unwrap();
        let cal = tuner.calibration();
        assert_eq!(cal.exp_offset, offset);
        assert!((2098..=2102).contains(&cal.exp_scale));

        // the scale pass started 52 codes away from its answer
        assert!(tuner.evaluations() <= (2100 - 2048) + 2);
    }

    #[test]
    fn accepted_codes_stay_on_the_dac() {
        let bench = Bench::new(linear_vco);
        let mut tuner = Tuner::new(TuningConfig::default(), UnitStep, Calibration::default()).unwrap();
        run(&mut tuner, &bench).unwrap();

        assert_eq!(bench.offset.get(), tuner.calibration().exp_offset);
        assert_eq!(bench.scale.get(), tuner.calibration().exp_scale);
        assert_eq!(tuner.stage(), TuningStage::Idle);
    }

    #[test]
    fn gives_up_when_the_window_is_stepped_over() {
        // three counts per code can never land exactly on the target
        fn coarse_vco(cv: u16, scale: u16, offset: u16) -> u16 {
            if cv == 0 {
                linear_vco(cv, scale, offset)
            } else {
                (569 + 3 * (scale as i32 - 2100)) as u16
            }
        }

        let mut config = TuningConfig::default();
        config.scale.tolerance = 0;
        config.max_evaluations = 200;

        let bench = Bench::new(coarse_vco);
        let mut tuner = Tuner::new(config, UnitStep, Calibration::default()).unwrap();

        match run(&mut tuner, &bench) {
            Err(TuningError::NotConverged { pass, .. }) => assert_eq!(pass, Pass::Scale),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(tuner.evaluations(), 200);
        assert!(tuner.is_finished());

        // the offset pass was still accepted
        assert_eq!(tuner.calibration().exp_offset, 2006);
        assert_eq!(tuner.calibration().exp_scale, INITIAL_TRIM_CODE);
    }

    #[test]
    fn gives_up_at_the_end_of_the_dac_range() {
        // the right offset code would be way past full scale
        fn unreachable_vco(_cv: u16, _scale: u16, offset: u16) -> u16 {
            (31_250 + (5000 - offset as i32) * 10).min(u16::MAX as i32) as u16
        }

        let mut config = TuningConfig::default();
        config.offset.initial_code = 4090;

        let bench = Bench::new(unreachable_vco);
        let mut tuner = Tuner::new(config, UnitStep, Calibration::default()).unwrap();

        assert_eq!(
            run(&mut tuner, &bench),
            Err(TuningError::CodeOutOfRange { pass: Pass::Offset })
        );
        assert_eq!(bench.offset.get(), 4095);
    }

    /// frequency rises linearly with the scale code, landing on 440 Hz at 2100
    fn linear_freq_vco(cv: u16, scale: u16, offset: u16) -> u16 {
        if cv == 0 {
            linear_vco(cv, scale, offset)
        } else {
            let freq = 440.0 + (scale as f32 - 2100.0) / 4.0;
            (250_000.0 / freq) as u16
        }
    }

    fn falling_scale_config() -> TuningConfig {
        let mut config = TuningConfig::default();
        config.scale.slope = Slope::Falling;
        config
    }

    #[test]
    fn two_point_interpolates_close_to_the_answer() {
        let bench = Bench::new(linear_freq_vco);
        let mut tuner = Tuner::new(falling_scale_config(), TwoPoint::default(), Calibration::default()).unwrap();
        run(&mut tuner, &bench).unwrap();

        let scale = tuner.calibration().exp_scale;
        assert!((2094..=2106).contains(&scale));

        // two probes, the interpolated guess, and maybe a couple of nudges
        assert!(tuner.evaluations() <= 5);
    }

    #[test]
    fn two_point_beats_unit_step_from_far_away() {
        let bench = Bench::new(linear_freq_vco);
        let mut unit = Tuner::new(falling_scale_config(), UnitStep, Calibration::default()).unwrap();
        run(&mut unit, &bench).unwrap();

        let bench = Bench::new(linear_freq_vco);
        let mut two_point = Tuner::new(falling_scale_config(), TwoPoint::default(), Calibration::default()).unwrap();
        run(&mut two_point, &bench).unwrap();

        assert!(two_point.evaluations() < unit.evaluations());
    }

    #[test]
    fn two_point_reports_flat_probes() {
        fn dead_vco(cv: u16, scale: u16, offset: u16) -> u16 {
            if cv == 0 {
                linear_vco(cv, scale, offset)
            } else {
                1000
            }
        }

        let bench = Bench::new(dead_vco);
        let mut tuner = Tuner::new(TuningConfig::default(), TwoPoint::default(), Calibration::default()).unwrap();

        // the offset pass still converges, only the scale pass trips
        assert_eq!(
            run(&mut tuner, &bench),
            Err(TuningError::Degenerate { pass: Pass::Scale })
        );
    }

    #[test]
    fn nudge_follows_the_slope() {
        let config = TuningConfig::default();
        let offset = PassPlan::new(Pass::Offset, &config).unwrap();
        let scale = PassPlan::new(Pass::Scale, &config).unwrap();

        // period too long
        assert_eq!(offset.nudge(100, offset.target + 100), Ok(101));
        assert_eq!(scale.nudge(100, scale.target + 100), Ok(99));

        // period too short
        assert_eq!(offset.nudge(100, offset.target - 100), Ok(99));
        assert_eq!(scale.nudge(100, scale.target - 100), Ok(101));
    }

    #[test]
    fn nudge_stays_inside_the_dac() {
        let plan = PassPlan::new(Pass::Scale, &TuningConfig::default()).unwrap();
        assert_eq!(
            plan.nudge(0, plan.target + 10),
            Err(TuningError::CodeOutOfRange { pass: Pass::Scale })
        );
        assert_eq!(
            plan.nudge(4095, plan.target - 10),
            Err(TuningError::CodeOutOfRange { pass: Pass::Scale })
        );
    }
}
