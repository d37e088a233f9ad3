//! Bit-banged bulk sampling of HX711 and HX717 load cell ADCs.
//!
//! Up to four chips are wired with a shared sample cadence and read in
//! lock-step: all clock pins are pulsed together and all data pins are
//! sampled together, producing one multi-chip record per conversion.
//! Samples are signed 24-bit counts, widened to `i32` without scaling;
//! converting counts to grams is the host's job.
//!
//! The crate is split along the boundaries a firmware integration has
//! to cross anyway:
//!
//! * [`time`]: tick arithmetic and the two busy-wait flavours the
//!   protocol needs (interrupt-masked for the minimum clock pulse,
//!   interrupt-polling for everything else).
//! * [`hx71x`]: the chip protocol itself: data-ready detection, the
//!   24-bit clock-out, gain/channel trailer pulses, validation and the
//!   reset/run pin levels.
//! * [`bulk`]: the bounded sample buffer and the [`Transport`] /
//!   [`LoadCellEndstop`] collaborator traits.
//! * [`capture`]: the periodic acquisition loop: a one-shot timer
//!   marks an instance pending from interrupt context, a cooperative
//!   task drains pending instances and handles faults by resetting the
//!   chips.
//!
//! The platform supplies pins (`embedded-hal` 1.0 digital traits), a
//! [`TimeSource`] over its hardware timer, a [`SampleTimer`] over its
//! one-shot scheduler and a [`Transport`] to the host. Nothing here
//! allocates; per-chip storage and the sample buffer are fixed
//! capacity.

#![cfg_attr(not(test), no_std)]

pub mod bulk;
pub mod capture;
pub mod hx71x;
pub mod time;

pub use bulk::{LoadCellEndstop, NoEndstop, SampleBuffer, Transport};
pub use capture::{Capture, CaptureBank, Handle, SampleTimer, Sampler};
pub use hx71x::{
    Chip, ConfigError, Fault, Hx71x, ReadOutcome, SampleSet, BYTES_PER_SAMPLE, MAX_CHIPS,
};
pub use time::{elapsed, spin_wait, spin_wait_masked, Ticks, TimeSource};

#[cfg(test)]
pub(crate) mod mock;
