//! # Interrupt links
//!
//! Two execution contexts share the VCO state: the interrupt handlers (UART receive and the oscillator edge timer)
//! and the cooperative main loop. Rather than sharing the decoder or the meter behind a lock, each interrupt handler
//! owns its half outright and talks to the main loop through lock free single producer single consumer queues.
//!
//! - `MidiQueues` carry decoded MIDI events from the UART handler to the main loop in one queue, in arrival order
//! - `MeterQueues` carry measurement requests from the main loop to the timer handler, and progress reports back
//!
//! Every meter report is tagged with the number of the request it answers. The handle throws away reports for
//! older requests, including ones the timer handler queued while a new request was on its way.
//!
//! The queues are typically placed in a `static` so the halves get the `'static` lifetime the interrupt handlers need.

use heapless::spsc::{Consumer, Producer, Queue};

use crate::{
    hardware::FrequencyCounter,
    midi::{MidiDecoder, MidiEvent, MidiSource},
    period_meter::{MeterCommand, MeterEvent, MeterLink, PeriodMeter},
};

/// The default depth of the MIDI queue, it holds one less than this
pub const MIDI_QUEUE_LEN: usize = 16;

/// The default depth of the meter queues, they hold one less than this
pub const METER_QUEUE_LEN: usize = 4;

/// The backing storage for the MIDI event queue
pub struct MidiQueues<const N: usize = MIDI_QUEUE_LEN> {
    events: Queue<MidiEvent, N>,
}

impl<const N: usize> MidiQueues<N> {
    /// `MidiQueues::new()` is a new empty queue
    pub const fn new() -> Self {
        Self { events: Queue::new() }
    }

    /// `mq.split(dec)` is the interrupt side port owning decoder `dec`, and the main loop side receiver
    pub fn split(&mut self, decoder: MidiDecoder) -> (MidiPort<'_, N>, MidiReceiver<'_, N>) {
        let (tx, rx) = self.events.split();

        (
            MidiPort {
                decoder,
                events: tx,
                dropped: 0,
            },
            MidiReceiver { events: rx },
        )
    }
}

impl<const N: usize> Default for MidiQueues<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// The UART interrupt side of the MIDI link
pub struct MidiPort<'a, const N: usize = MIDI_QUEUE_LEN> {
    decoder: MidiDecoder,
    events: Producer<'a, MidiEvent, N>,

    // events lost to a full queue
    dropped: u32,
}

impl<'a, const N: usize> MidiPort<'a, N> {
    /// `mp.on_byte(b)` decodes received byte `b` and queues any message it completes
    ///
    /// When the main loop falls behind and the queue is full the new event is dropped and counted.
    pub fn on_byte(&mut self, byte: u8) {
        self.decoder.feed(byte);

        while let Some(event) = self.decoder.take_event() {
            self.dropped += self.events.enqueue(event).is_err() as u32;
        }
    }

    /// `mp.dropped()` is the number of events lost because the main loop fell behind
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// `mp.decoder()` is the decoder owned by the port
    pub fn decoder(&self) -> &MidiDecoder {
        &self.decoder
    }
}

/// The main loop side of the MIDI link
pub struct MidiReceiver<'a, const N: usize = MIDI_QUEUE_LEN> {
    events: Consumer<'a, MidiEvent, N>,
}

impl<'a, const N: usize> MidiSource for MidiReceiver<'a, N> {
    fn take_event(&mut self) -> Option<MidiEvent> {
        self.events.dequeue()
    }
}

/// The backing storage for the period meter queues
pub struct MeterQueues<const N: usize = METER_QUEUE_LEN> {
    commands: Queue<MeterCommand, N>,
    events: Queue<(u8, MeterEvent), N>,
}

impl<const N: usize> MeterQueues<N> {
    /// `MeterQueues::new()` is a new set of empty queues
    pub const fn new() -> Self {
        Self {
            commands: Queue::new(),
            events: Queue::new(),
        }
    }

    /// `mq.split(pm)` is the interrupt side port owning period meter `pm`, and the main loop side handle
    pub fn split<C: FrequencyCounter>(
        &mut self,
        meter: PeriodMeter<C>,
    ) -> (MeterPort<'_, C, N>, MeterHandle<'_, N>) {
        let (cmd_tx, cmd_rx) = self.commands.split();
        let (event_tx, event_rx) = self.events.split();

        (
            MeterPort {
                meter,
                commands: cmd_rx,
                events: event_tx,
                generation: 0,
            },
            MeterHandle {
                commands: cmd_tx,
                events: event_rx,
                generation: 0,
            },
        )
    }
}

impl<const N: usize> Default for MeterQueues<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// The timer interrupt side of the meter link
pub struct MeterPort<'a, C: FrequencyCounter, const N: usize = METER_QUEUE_LEN> {
    meter: PeriodMeter<C>,
    commands: Consumer<'a, MeterCommand, N>,
    events: Producer<'a, (u8, MeterEvent), N>,

    // the number of arm requests handled, wrapping
    generation: u8,
}

impl<'a, C: FrequencyCounter, const N: usize> MeterPort<'a, C, N> {
    /// `mp.on_edge()` handles pending requests then advances the meter by one oscillator edge
    ///
    /// Must be called from the oscillator edge interrupt.
    pub fn on_edge(&mut self) {
        self.service_commands();
        self.advance();
    }

    /// `mp.service_commands()` handles pending requests without waiting for an edge
    pub fn service_commands(&mut self) {
        while let Some(command) = self.commands.dequeue() {
            match command {
                MeterCommand::Arm => {
                    self.generation = self.generation.wrapping_add(1);
                    self.meter.arm();
                }
            }
        }
    }

    fn advance(&mut self) {
        if let Some(event) = self.meter.on_edge() {
            // at most two events per request, and the handle throws away stale ones
            let _ = self.events.enqueue((self.generation, event));
        }
    }

    /// `mp.meter()` is the period meter owned by the port
    pub fn meter(&self) -> &PeriodMeter<C> {
        &self.meter
    }
}

/// The main loop side of the meter link
pub struct MeterHandle<'a, const N: usize = METER_QUEUE_LEN> {
    commands: Producer<'a, MeterCommand, N>,
    events: Consumer<'a, (u8, MeterEvent), N>,

    // the number of arm requests queued, wrapping
    generation: u8,
}

impl<'a, const N: usize> MeterLink for MeterHandle<'a, N> {
    fn arm(&mut self) {
        if self.commands.enqueue(MeterCommand::Arm).is_ok() {
            self.generation = self.generation.wrapping_add(1);
        }
    }

    fn poll_event(&mut self) -> Option<MeterEvent> {
        while let Some((generation, event)) = self.events.dequeue() {
            if generation == self.generation {
                return Some(event);
            }
        }
        None
    }
}
