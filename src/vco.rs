//! # VCO scheduler
//!
//! The top level of the control core, run from the main loop. It ties the MIDI link, the note stack, the pitch bend
//! compositor, and the self tuning controller to the DAC outputs.
//!
//! The VCO is always in one of two modes:
//!
//! - tuning, entered at power up and on request, where the tuner owns the DACs and MIDI input waits in its queues
//! - playing, where each received message updates the CV
//!
//! Each call to `poll()` does a small bounded amount of work, so the main loop stays responsive.

use heapless::Deque;

use crate::{
    config::Config,
    diagnostics::Diagnostic,
    error::{Error, TuningError},
    hardware::{CvOutputs, DacChannel},
    lookup_tables::note_to_dac,
    midi::{MidiEvent, MidiSource, NoteEvent},
    note_stack::{NoteSlot, NoteStack, Release, NOTE_STACK_LEN},
    period_meter::MeterLink,
    pitch_bend::{bend_note, compose},
    tuning::{Calibration, Tuner, TunerEvent, TuningStrategy, UnitStep},
};

/// The CV code written while no note is sounding
pub const REST_CODE: u16 = 0;

/// The number of diagnostics remembered, the oldest are forgotten first
pub const DIAGNOSTICS_LEN: usize = 16;

/// The most MIDI events handled by one call to `Vco::poll()`
pub const EVENTS_PER_POLL: usize = 4;

/// A MIDI controlled, self tuning VCO is represented here.
///
/// # Generic arguments:
///
/// * `O` - the DAC and hard sync outputs
///
/// * `S` - the tuning search strategy
///
/// * `N` - the number of held notes to remember
pub struct Vco<O: CvOutputs, S: TuningStrategy = UnitStep, const N: usize = NOTE_STACK_LEN> {
    out: O,
    config: Config,

    notes: NoteStack<N>,

    // the latest pitch bend in `[-2048, 2047]`
    bend: i16,

    // a bend arrived which hasn't been applied to the CV yet
    bend_pending: bool,

    // `None` when the board has no tuning hardware
    tuner: Option<Tuner<S>>,
    tuning: bool,
    calibration: Calibration,
    tuning_outcome: Option<Result<Calibration, TuningError>>,

    diagnostics: Deque<Diagnostic, DIAGNOSTICS_LEN>,
}

impl<O: CvOutputs, S: TuningStrategy, const N: usize> Vco<O, S, N> {
    /// `Vco::new(out, cfg, s)` is a new VCO driving outputs `out` with settings `cfg` and tuning search strategy `s`
    ///
    /// The calibration DACs are set to their starting codes and the CV to rest. If tuning is configured the VCO
    /// starts out tuning, otherwise it is ready to play.
    pub fn new(out: O, config: Config, strategy: S) -> Result<Self, Error> {
        let calibration = config
            .tuning
            .as_ref()
            .map(Calibration::from)
            .unwrap_or_default();

        let tuner = match config.tuning {
            Some(tuning) => Some(Tuner::new(tuning, strategy, calibration)?),
            None => None,
        };

        let mut vco = Self {
            out,
            config,
            notes: NoteStack::new(),
            bend: 0,
            bend_pending: false,
            tuner,
            tuning: false,
            calibration,
            tuning_outcome: None,
            diagnostics: Deque::new(),
        };

        vco.write_calibration();
        vco.rest();

        if vco.tuner.is_some() {
            vco.begin_tuning();
        }

        Ok(vco)
    }

    /// `vco.poll(midi, meter)` does one iteration of the main loop
    ///
    /// While tuning this services one tuner stage and leaves MIDI alone. While playing this handles up to
    /// `EVENTS_PER_POLL` MIDI events in the order they arrived, then writes the CV for the latest pitch bend once.
    pub fn poll<M: MidiSource, L: MeterLink>(&mut self, midi: &mut M, meter: &mut L) {
        if self.tuning {
            self.service_tuner(meter);
            return;
        }

        for _ in 0..EVENTS_PER_POLL {
            match midi.take_event() {
                Some(MidiEvent::NoteOn(event)) => self.note_on(event),
                Some(MidiEvent::NoteOff(event)) => self.note_off(event),
                Some(MidiEvent::PitchBend(bend)) => {
                    self.bend = bend;
                    self.bend_pending = true;
                    self.report(Diagnostic::PitchBend(bend));
                }
                None => break,
            }
        }

        if self.bend_pending {
            self.apply_bend();
        }
    }

    /// `vco.run(midi, meter)` polls forever
    pub fn run<M: MidiSource, L: MeterLink>(&mut self, midi: &mut M, meter: &mut L) -> ! {
        loop {
            self.poll(midi, meter);
        }
    }

    /// `vco.retune()` forgets held notes, silences the VCO, and starts tuning over
    ///
    /// Does nothing on boards without tuning hardware.
    pub fn retune(&mut self) -> Result<(), Error> {
        let calibration = self.calibration;
        let Some(tuner) = self.tuner.as_mut() else {
            return Ok(());
        };
        tuner.restart(calibration)?;

        self.notes.clear();
        self.rest();
        self.begin_tuning();

        Ok(())
    }

    fn begin_tuning(&mut self) {
        self.tuning = true;
        self.tuning_outcome = None;

        // the oscillator has to run to be measured
        self.out.set_hard_sync(false);
        self.report(Diagnostic::TuneBegin);
    }

    fn service_tuner<L: MeterLink>(&mut self, meter: &mut L) {
        let (event, finished, calibration) = match self.tuner.as_mut() {
            Some(tuner) => (
                tuner.service(&mut self.out, meter),
                tuner.is_finished(),
                tuner.calibration(),
            ),
            None => return,
        };

        match event {
            Ok(TunerEvent::Nudged {
                pass,
                count,
                from,
                to,
            }) => self.report(Diagnostic::TuneNudge {
                pass,
                count,
                up: from < to,
            }),
            Ok(TunerEvent::Accepted { pass, code }) => self.report(Diagnostic::PassAccepted { pass, code }),
            Ok(_) => (),
            Err(err) => self.report(Diagnostic::TuneFailed(err)),
        }

        if finished {
            self.finish_tuning(event.map(|_| calibration), calibration);
        }
    }

    /// `vco.finish_tuning(o, cal)` goes back to playing with calibration `cal` after tuning ended with outcome `o`
    fn finish_tuning(&mut self, outcome: Result<Calibration, TuningError>, calibration: Calibration) {
        self.tuning = false;
        self.calibration = calibration;
        self.tuning_outcome = Some(outcome);

        // a failed pass leaves its last tried code on the DAC, put the accepted ones back
        self.write_calibration();
        self.rest();

        if outcome.is_ok() {
            self.report(Diagnostic::TuneFinished(calibration));
        }
    }

    fn note_on(&mut self, event: NoteEvent) {
        let base = match note_to_dac(event.note) {
            Ok(base) => base,
            Err(_) => {
                self.report(Diagnostic::NoteRejected { note: event.note });
                return;
            }
        };

        self.notes.note_on(event.note, event.velocity);

        let dac = compose(base, self.bend, self.config.bend_scale);
        self.out.write_dac(DacChannel::Cv, dac);
        if self.config.hard_sync {
            self.out.set_hard_sync(false);
        }
        self.bend_pending = false;

        self.report(Diagnostic::NoteOn {
            note: event.note,
            velocity: event.velocity,
            dac,
        });
    }

    fn note_off(&mut self, event: NoteEvent) {
        self.report(Diagnostic::NoteOff {
            note: event.note,
            velocity: event.velocity,
        });

        match self.notes.note_off(event.note) {
            Release::Sounding(slot) => self.sound(slot),
            Release::Silent => self.rest(),
            Release::NotHeld => (),
        }
    }

    fn apply_bend(&mut self) {
        self.bend_pending = false;
        if let Some(slot) = self.notes.sounding() {
            self.sound(slot);
        }
    }

    /// `vco.sound(s)` writes the bent CV for slot `s`
    fn sound(&mut self, slot: NoteSlot) {
        // only notes with a table entry ever make it onto the stack
        if let Ok(Some(dac)) = bend_note(Some(slot), self.bend, self.config.bend_scale) {
            self.out.write_dac(DacChannel::Cv, dac);
        }
    }

    /// `vco.rest()` silences the VCO
    fn rest(&mut self) {
        self.out.write_dac(DacChannel::Cv, REST_CODE);
        if self.config.hard_sync {
            self.out.set_hard_sync(true);
        }
    }

    fn write_calibration(&mut self) {
        self.out
            .write_dac(DacChannel::ExpScale, self.calibration.exp_scale);
        self.out
            .write_dac(DacChannel::ExpOffset, self.calibration.exp_offset);
    }

    /// `vco.report(d)` remembers diagnostic `d` and mirrors it to the log
    fn report(&mut self, diagnostic: Diagnostic) {
        log::log!(diagnostic.level(), "{}", diagnostic);

        if self.diagnostics.is_full() {
            self.diagnostics.pop_front();
        }
        let _ = self.diagnostics.push_back(diagnostic);
    }

    /// `vco.pop_diagnostic()` is the oldest remembered diagnostic, if any, and forgets it
    pub fn pop_diagnostic(&mut self) -> Option<Diagnostic> {
        self.diagnostics.pop_front()
    }

    /// `vco.is_tuning()` is true iff the tuner owns the DACs
    pub fn is_tuning(&self) -> bool {
        self.tuning
    }

    /// `vco.calibration()` is the trim codes in use
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// `vco.tuning_outcome()` is how the last tuning run ended, `None` if it hasn't ended or never ran
    pub fn tuning_outcome(&self) -> Option<Result<Calibration, TuningError>> {
        self.tuning_outcome
    }

    /// `vco.sounding()` is the note currently sounding, if any
    pub fn sounding(&self) -> Option<NoteSlot> {
        self.notes.sounding()
    }

    /// `vco.notes()` is the note stack
    pub fn notes(&self) -> &NoteStack<N> {
        &self.notes
    }

    /// `vco.pitch_bend()` is the latest pitch bend in `[-2048, 2047]`
    pub fn pitch_bend(&self) -> i16 {
        self.bend
    }

    /// `vco.config()` is the settings the VCO was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// `vco.outputs()` is the DAC and hard sync outputs
    pub fn outputs(&self) -> &O {
        &self.out
    }
}
