//! # Note lookup tables
//!
//! The CV DAC is 12 bits wide with a 2.5 volt reference. The CV output stage scales 10 volts of 1volt/octave pitch
//! down by 1/4, so the full DAC range spans 10 octaves, or MIDI notes `[0..120]`. Each semitone is about 34 codes.
//!
//! A parallel table holds the expected frequency of each note in whole hertz, which the tuner uses to derive its
//! target period counts.
//!
//! Notes above 120 have no entry. Lookups are bounds checked and report `Error::NoteOutOfRange` instead.

use crate::error::Error;

/// The number of notes covered by the lookup tables
pub const NUM_TABLE_NOTES: usize = 121;

/// The highest note number with a table entry
pub const MAX_TABLE_NOTE: u8 = (NUM_TABLE_NOTES - 1) as u8;

/// `note_to_dac(n)` is the 12 bit CV DAC code for note `n`
///
/// # Examples
///
/// ```
/// use mcu_vco::{lookup_tables::note_to_dac, Error};
///
/// assert_eq!(note_to_dac(60), Ok(2047));
/// assert_eq!(note_to_dac(121), Err(Error::NoteOutOfRange(121)));
/// ```
pub fn note_to_dac(note: u8) -> Result<u16, Error> {
    NOTE_TO_DAC_LUT
        .get(note as usize)
        .copied()
        .ok_or(Error::NoteOutOfRange(note))
}

/// `note_to_freq(n)` is the frequency of note `n` in hertz, rounded to the nearest whole hertz
pub fn note_to_freq(note: u8) -> Result<u16, Error> {
    NOTE_TO_FREQ_LUT
        .get(note as usize)
        .copied()
        .ok_or(Error::NoteOutOfRange(note))
}

static NOTE_TO_DAC_LUT: [u16; NUM_TABLE_NOTES] = [
    0, 33, 67, 101, 136, 170, 204, 238, 272, 306, 340, 374, //
    409, 443, 477, 511, 545, 579, 613, 648, 682, 716, 750, 784, //
    818, 852, 886, 921, 955, 989, 1023, 1057, 1091, 1125, 1160, 1194, //
    1228, 1262, 1296, 1330, 1364, 1398, 1433, 1467, 1501, 1535, 1569, 1603, //
    1637, 1672, 1706, 1740, 1774, 1808, 1842, 1876, 1910, 1945, 1979, 2013, //
    2047, 2081, 2115, 2149, 2184, 2218, 2252, 2286, 2320, 2354, 2388, 2422, //
    2457, 2491, 2525, 2559, 2593, 2627, 2661, 2696, 2730, 2764, 2798, 2832, //
    2866, 2900, 2934, 2969, 3003, 3037, 3071, 3105, 3139, 3173, 3208, 3242, //
    3276, 3310, 3344, 3378, 3412, 3446, 3481, 3515, 3549, 3583, 3617, 3651, //
    3685, 3720, 3754, 3788, 3822, 3856, 3890, 3924, 3958, 3993, 4027, 4061, //
    4095,
];

static NOTE_TO_FREQ_LUT: [u16; NUM_TABLE_NOTES] = [
    8, 9, 9, 10, 10, 11, 12, 12, 13, 14, 15, 15, //
    16, 17, 18, 19, 21, 22, 23, 24, 26, 28, 29, 31, //
    33, 35, 37, 39, 41, 44, 46, 49, 52, 55, 58, 62, //
    65, 69, 73, 78, 82, 87, 92, 98, 104, 110, 117, 123, //
    131, 139, 147, 156, 165, 175, 185, 196, 208, 220, 233, 247, //
    262, 277, 294, 311, 330, 349, 370, 392, 415, 440, 466, 494, //
    523, 554, 587, 622, 659, 698, 740, 784, 831, 880, 932, 988, //
    1047, 1109, 1175, 1245, 1319, 1397, 1480, 1568, 1661, 1760, 1865, 1976, //
    2093, 2217, 2349, 2489, 2637, 2794, 2960, 3136, 3322, 3520, 3729, 3951, //
    4186, 4435, 4699, 4978, 5274, 5588, 5920, 6272, 6645, 7040, 7459, 7902, //
    8372,
];
