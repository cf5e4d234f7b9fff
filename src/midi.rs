//! # MIDI Decoder
//!
//! The decoder is fed MIDI data one byte at a time, typically straight from the UART receive interrupt, and rebuilds
//! Note-On, Note-Off, and Pitch-Bend messages addressed to a single MIDI channel.
//!
//! Each of the three message classes has its own small state machine. A data byte advances every class that is
//! waiting for data, but only the class whose status byte was seen last is ever waiting in practice. Completed
//! messages park in a `Ready` stage until the main loop takes them. The decoder remembers the order in which the
//! classes became ready, so `take_event()` hands them out in arrival order.
//!
//! Not every part of the MIDI protocol is handled:
//!
//! - running status is not supported, every message must re-send its status byte
//! - control change, program change, aftertouch, and system common messages are ignored
//! - system real-time bytes (clock, start, stop, active sensing, ...) are ignored wherever they appear, even between
//!   the data bytes of another message

use heapless::Vec;

/// Status nibble of a Note-Off message
pub const NOTE_OFF_BASE: u8 = 0x80;

/// Status nibble of a Note-On message
pub const NOTE_ON_BASE: u8 = 0x90;

/// Status nibble of a Pitch-Bend message
pub const PITCH_BEND_BASE: u8 = 0xE0;

/// The real-time clock byte, sent 24 times per quarter note by sequencers
pub const CLOCK_SYNC: u8 = 0xF8;

/// The smallest pitch bend value, wheel all the way down
pub const PITCH_BEND_MIN: i16 = -2048;

/// The largest pitch bend value, wheel all the way up
pub const PITCH_BEND_MAX: i16 = 2047;

/// The progress of one message class through its bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage<P> {
    /// Nothing in flight
    Idle,
    /// The status byte arrived, waiting for the first data byte
    AwaitingByte1,
    /// The first data byte arrived and is stashed, waiting for the second
    AwaitingByte2 { first: u8 },
    /// A complete message waiting to be taken by the consumer
    Ready(P),
}

/// A received Note-On or Note-Off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    /// in `[0..127]`
    pub note: u8,
    /// in `[0..127]`
    pub velocity: u8,
}

/// A decoded message of any of the three classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn(NoteEvent),
    NoteOff(NoteEvent),
    /// in `[-2048, 2047]`
    PitchBend(i16),
}

/// Something the main loop can take decoded MIDI events from
///
/// Taking an event hands ownership of it to the caller, the source forgets it.
pub trait MidiSource {
    /// `src.take_event()` is the oldest pending event of any class, if any
    ///
    /// Events come out in the order their last byte arrived in.
    fn take_event(&mut self) -> Option<MidiEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    NoteOn,
    NoteOff,
    PitchBend,
}

/// A byte-at-a-time MIDI decoder for a single channel is represented here.
#[derive(Debug, Clone)]
pub struct MidiDecoder {
    // the MIDI channel to listen to in `[0..15]`
    channel: u8,

    note_on: Stage<NoteEvent>,
    note_off: Stage<NoteEvent>,
    pitch_bend: Stage<i16>,

    // the classes which are ready, oldest first
    ready: Vec<Class, 3>,
}

impl MidiDecoder {
    /// `MidiDecoder::new(c)` is a new decoder which accepts messages on MIDI channel `c`
    ///
    /// # Arguments
    ///
    /// * `channel` - The zero-based MIDI channel to listen to in `[0..15]`. All other MIDI channels are ignored.
    ///
    /// The channel is clamped to `[0..15]`
    pub fn new(channel: u8) -> Self {
        Self {
            channel: channel.min(15),
            note_on: Stage::Idle,
            note_off: Stage::Idle,
            pitch_bend: Stage::Idle,
            ready: Vec::new(),
        }
    }

    /// `dec.channel()` is the zero-based MIDI channel the decoder listens to
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// `dec.feed(b)` advances the decoder by one received byte `b`
    ///
    /// It is expected to call this function every time a new MIDI byte is received. It does a constant amount of
    /// work and never blocks.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcu_vco::midi::{MidiDecoder, MidiEvent, MidiSource, NoteEvent};
    ///
    /// let mut dec = MidiDecoder::new(1);
    /// dec.feed(0x91); // note-on on channel 1
    /// dec.feed(42); // note number 42
    /// dec.feed(127); // max velocity
    ///
    /// assert_eq!(dec.take_event(), Some(MidiEvent::NoteOn(NoteEvent { note: 42, velocity: 127 })));
    /// assert_eq!(dec.take_event(), None);
    /// ```
    pub fn feed(&mut self, byte: u8) {
        if is_real_time(byte) {
            return;
        }

        self.feed_note_on(byte);
        self.feed_note_off(byte);
        self.feed_pitch_bend(byte);
        self.track_ready();
    }

    // at most one class becomes ready per byte, so appending keeps the arrival order
    fn track_ready(&mut self) {
        let stages = [
            (Class::NoteOn, is_ready(&self.note_on)),
            (Class::NoteOff, is_ready(&self.note_off)),
            (Class::PitchBend, is_ready(&self.pitch_bend)),
        ];

        for (class, ready) in stages {
            let listed = self.ready.contains(&class);
            if ready && !listed {
                // one slot per class, never full
                let _ = self.ready.push(class);
            } else if !ready && listed {
                self.ready.retain(|c| *c != class);
            }
        }
    }

    fn feed_note_on(&mut self, byte: u8) {
        if byte == NOTE_ON_BASE | self.channel {
            self.note_on = Stage::AwaitingByte1;
            return;
        }

        self.note_on = match (self.note_on, is_status(byte)) {
            (Stage::AwaitingByte1 | Stage::AwaitingByte2 { .. }, true) => Stage::Idle,
            (Stage::AwaitingByte1, false) => Stage::AwaitingByte2 { first: byte },
            // note-on with velocity of zero is interpreted as note-off
            (Stage::AwaitingByte2 { first }, false) if byte == 0 => {
                // replaces any parked note-off, which then counts as the newest event
                self.ready.retain(|c| *c != Class::NoteOff);
                self.note_off = Stage::Ready(NoteEvent {
                    note: first,
                    velocity: 0,
                });
                Stage::Idle
            }
            (Stage::AwaitingByte2 { first }, false) => Stage::Ready(NoteEvent {
                note: first,
                velocity: byte,
            }),
            (stage, _) => stage,
        };
    }

    fn feed_note_off(&mut self, byte: u8) {
        if byte == NOTE_OFF_BASE | self.channel {
            self.note_off = Stage::AwaitingByte1;
            return;
        }

        self.note_off = match (self.note_off, is_status(byte)) {
            (Stage::AwaitingByte1 | Stage::AwaitingByte2 { .. }, true) => Stage::Idle,
            (Stage::AwaitingByte1, false) => Stage::AwaitingByte2 { first: byte },
            (Stage::AwaitingByte2 { first }, false) => Stage::Ready(NoteEvent {
                note: first,
                velocity: byte,
            }),
            (stage, _) => stage,
        };
    }

    fn feed_pitch_bend(&mut self, byte: u8) {
        if byte == PITCH_BEND_BASE | self.channel {
            self.pitch_bend = Stage::AwaitingByte1;
            return;
        }

        self.pitch_bend = match (self.pitch_bend, is_status(byte)) {
            (Stage::AwaitingByte1 | Stage::AwaitingByte2 { .. }, true) => Stage::Idle,
            // only the top 5 bits of the LSB are kept, for a 12 bit result
            (Stage::AwaitingByte1, false) => Stage::AwaitingByte2 { first: byte >> 2 },
            (Stage::AwaitingByte2 { first }, false) => {
                Stage::Ready(first as i16 + 32 * byte as i16 + PITCH_BEND_MIN)
            }
            (stage, _) => stage,
        };
    }

    /// `dec.note_on_stage()` is the current stage of the Note-On state machine
    pub fn note_on_stage(&self) -> Stage<NoteEvent> {
        self.note_on
    }

    /// `dec.note_off_stage()` is the current stage of the Note-Off state machine
    pub fn note_off_stage(&self) -> Stage<NoteEvent> {
        self.note_off
    }

    /// `dec.pitch_bend_stage()` is the current stage of the Pitch-Bend state machine
    pub fn pitch_bend_stage(&self) -> Stage<i16> {
        self.pitch_bend
    }

    /// `dec.take_note_on()` is the pending Note-On, if any
    pub fn take_note_on(&mut self) -> Option<NoteEvent> {
        let event = take_ready(&mut self.note_on);
        self.track_ready();
        event
    }

    /// `dec.take_note_off()` is the pending Note-Off, if any
    pub fn take_note_off(&mut self) -> Option<NoteEvent> {
        let event = take_ready(&mut self.note_off);
        self.track_ready();
        event
    }

    /// `dec.take_pitch_bend()` is the pending Pitch-Bend value in `[-2048, 2047]`, if any
    pub fn take_pitch_bend(&mut self) -> Option<i16> {
        let bend = take_ready(&mut self.pitch_bend);
        self.track_ready();
        bend
    }
}

impl MidiSource for MidiDecoder {
    fn take_event(&mut self) -> Option<MidiEvent> {
        match *self.ready.first()? {
            Class::NoteOn => self.take_note_on().map(MidiEvent::NoteOn),
            Class::NoteOff => self.take_note_off().map(MidiEvent::NoteOff),
            Class::PitchBend => self.take_pitch_bend().map(MidiEvent::PitchBend),
        }
    }
}

fn is_ready<P>(stage: &Stage<P>) -> bool {
    matches!(stage, Stage::Ready(_))
}

/// `take_ready(s)` is the payload of stage `s` if it is ready, leaving it idle. Other stages are left alone.
fn take_ready<P: Copy>(stage: &mut Stage<P>) -> Option<P> {
    match *stage {
        Stage::Ready(payload) => {
            *stage = Stage::Idle;
            Some(payload)
        }
        _ => None,
    }
}

/// `is_status(b)` is true iff `b` is a status byte, data bytes never have the top bit set
fn is_status(byte: u8) -> bool {
    byte & 0x80 != 0
}

/// `is_real_time(b)` is true iff `b` is a system real-time byte, these may show up anywhere in the stream
fn is_real_time(byte: u8) -> bool {
    byte >= CLOCK_SYNC
}
