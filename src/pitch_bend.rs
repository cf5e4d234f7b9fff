//! # Pitch bend compositor
//!
//! Pitch bend is added straight onto the CV DAC code of the sounding note. The bend value in `[-2048, 2047]` is
//! scaled by a fixed point factor and the sum is masked to the width of the DAC register, so out of range sums wrap
//! around exactly like the hardware register would truncate them.

use crate::{error::Error, lookup_tables::note_to_dac, note_stack::NoteSlot};

/// The CV DAC is 12 bits wide
pub const DAC_MASK: u16 = 0x0FFF;

/// Roughly the number of CV DAC codes per semitone
pub const CODES_PER_SEMITONE: i32 = 34;

/// The denominator of the bend scale, a full bend wheel deflection in either direction
const BEND_SCALE_DENOMINATOR: i32 = 2048;

/// The fixed point factor applied to pitch bend values, `numerator / 2048` DAC codes per unit of bend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BendScale(i32);

impl BendScale {
    /// `BendScale::from_numerator(n)` is a scale of `n / 2048` codes per unit of bend
    pub const fn from_numerator(numerator: i32) -> Self {
        Self(numerator)
    }

    /// `BendScale::from_semitones(s)` is a scale where full bend reaches `s` semitones up or down
    pub const fn from_semitones(semitones: u8) -> Self {
        Self(CODES_PER_SEMITONE * semitones as i32)
    }

    /// `bs.numerator()` is the numerator of the scale, over 2048
    pub fn numerator(&self) -> i32 {
        self.0
    }

    /// `bs.offset(b)` is the number of DAC codes that bend `b` moves the CV, rounded down
    ///
    /// Rounding down means any downward bend lowers the CV by at least one code, the same as truncating the bent
    /// code as a whole.
    pub fn offset(&self, bend: i16) -> i32 {
        (bend as i32 * self.0).div_euclid(BEND_SCALE_DENOMINATOR)
    }
}

impl Default for BendScale {
    /// Full bend is 2 semitones, the usual MIDI default
    fn default() -> Self {
        Self::from_semitones(2)
    }
}

/// `compose(c, b, s)` is CV DAC code `c` bent by bend value `b` with scale `s`, wrapped to the DAC width
///
/// # Examples
///
/// ```
/// use mcu_vco::pitch_bend::{compose, BendScale};
///
/// let scale = BendScale::default();
/// assert_eq!(compose(2047, 0, scale), 2047);
/// assert_eq!(compose(2047, 2047, scale), 2047 + 67);
/// assert_eq!(compose(2047, -1, scale), 2046);
/// ```
pub fn compose(base_code: u16, bend: i16, scale: BendScale) -> u16 {
    let sum = base_code as i32 + scale.offset(bend);
    (sum as u16) & DAC_MASK
}

/// `bend_note(s, b, sc)` is the bent CV DAC code for the sounding slot `s`, or `None` if nothing is sounding
pub fn bend_note(sounding: Option<NoteSlot>, bend: i16, scale: BendScale) -> Result<Option<u16>, Error> {
    match sounding {
        Some(slot) => Ok(Some(compose(note_to_dac(slot.note)?, bend, scale))),
        None => Ok(None),
    }
}
