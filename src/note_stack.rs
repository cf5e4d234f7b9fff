//! # Note priority stack
//!
//! The VCO can only play one note at a time, but players hold down chords and play legato lines. The stack remembers
//! every note that is currently held, in the order they were triggered, so that when the sounding note is released
//! the most recently triggered note which is still held takes over.
//!
//! Held notes are always packed at the front of a fixed size array, most recent first. Slot zero is the sounding note.

/// The default number of held notes the stack can remember
pub const NOTE_STACK_LEN: usize = 16;

/// One remembered note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoteSlot {
    /// in `[0..127]`
    pub note: u8,
    /// in `[0..127]`
    pub velocity: u8,
    pub active: bool,
}

/// What happened after a note was released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Some notes are still held and this one should be sounding
    Sounding(NoteSlot),
    /// The last held note was released
    Silent,
    /// The note wasn't held, nothing changed
    NotHeld,
}

/// A fixed capacity last-note-priority stack is represented here.
///
/// # Generic arguments:
///
/// * `N` - the number of held notes to remember. If the player holds more than `N` notes the oldest one is forgotten.
#[derive(Debug, Clone)]
pub struct NoteStack<const N: usize = NOTE_STACK_LEN> {
    slots: [NoteSlot; N],

    // number of active slots, always packed at the front
    len: usize,
}

impl<const N: usize> Default for NoteStack<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> NoteStack<N> {
    /// `NoteStack::new()` is a new empty note stack
    pub fn new() -> Self {
        Self {
            slots: [NoteSlot::default(); N],
            len: 0,
        }
    }

    /// `ns.note_on(n, v)` remembers note `n` with velocity `v` as the newest note, and is the slot that should sound
    ///
    /// A note which is already held is moved to the front rather than remembered twice. When the stack is full the
    /// oldest note is overwritten.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcu_vco::note_stack::NoteStack;
    ///
    /// let mut ns = NoteStack::<4>::new();
    /// ns.note_on(60, 100);
    /// ns.note_on(64, 100);
    /// assert_eq!(ns.sounding().map(|s| s.note), Some(64));
    /// ```
    pub fn note_on(&mut self, note: u8, velocity: u8) -> NoteSlot {
        let slot = NoteSlot {
            note,
            velocity,
            active: true,
        };

        if N == 0 {
            return slot;
        }

        if self.position(note).is_some() {
            self.deactivate(note);
            self.compact();
        }

        // the last slot falls off the end if we're full
        let shift_len = self.len.min(N - 1);
        self.slots.copy_within(0..shift_len, 1);
        self.slots[0] = slot;
        self.len = (self.len + 1).min(N);

        slot
    }

    /// `ns.note_off(n)` forgets every copy of note `n`, packs the held notes back to the front, and is the outcome
    pub fn note_off(&mut self, note: u8) -> Release {
        if self.position(note).is_none() {
            return Release::NotHeld;
        }

        self.deactivate(note);
        self.compact();

        match self.sounding() {
            Some(slot) => Release::Sounding(slot),
            None => Release::Silent,
        }
    }

    /// `ns.deactivate(n)` marks every active slot holding note `n` as inactive, leaving gaps behind
    fn deactivate(&mut self, note: u8) {
        self.slots[..self.len]
            .iter_mut()
            .filter(|s| s.note == note)
            .for_each(|s| s.active = false);
    }

    /// `ns.compact()` sweeps forward shifting active slots left over inactive ones
    ///
    /// The sweep is stable, so the surviving notes keep their relative age order.
    fn compact(&mut self) {
        let mut write = 0;
        for read in 0..self.len {
            if self.slots[read].active {
                self.slots[write] = self.slots[read];
                write += 1;
            }
        }
        self.slots[write..].iter_mut().for_each(|s| s.active = false);
        self.len = write;
    }

    /// `ns.position(n)` is the index of the active slot holding note `n`, if any
    fn position(&self, note: u8) -> Option<usize> {
        self.held().iter().position(|s| s.note == note)
    }

    /// `ns.sounding()` is the slot which should currently be sounding, if any notes are held
    pub fn sounding(&self) -> Option<NoteSlot> {
        self.held().first().copied()
    }

    /// `ns.held()` is every held note, most recent first
    pub fn held(&self) -> &[NoteSlot] {
        &self.slots[..self.len]
    }

    /// `ns.slots()` is the whole backing array, active slots followed by inactive ones
    pub fn slots(&self) -> &[NoteSlot] {
        &self.slots
    }

    /// `ns.len()` is the number of held notes
    pub fn len(&self) -> usize {
        self.len
    }

    /// `ns.is_empty()` is true iff no notes are held
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `ns.capacity()` is the maximum number of notes remembered at once
    pub fn capacity(&self) -> usize {
        N
    }

    /// `ns.clear()` forgets every held note
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| s.active = false);
        self.len = 0;
    }
}
