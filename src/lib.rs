#![no_std]
#![doc = include_str!("../README.md")]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod diagnostics;
mod error;
pub mod hardware;
pub mod link;
pub mod lookup_tables;
pub mod midi;
pub mod note_stack;
pub mod period_meter;
pub mod pitch_bend;
pub mod tuning;
pub mod vco;

#[cfg(test)]
mod sim;

pub use error::{Error, TuningError};
