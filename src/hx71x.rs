//! The HX711/HX717 chip protocol: lock-step bit-banged reads of 1-4
//! chips, plus the reset/run clock levels used for fault recovery.

use embedded_hal::digital::{InputPin, OutputPin};
use heapless::Vec;

use crate::time::{self, Ticks, TimeSource};

/// Maximum number of chips sampled in lock-step.
pub const MAX_CHIPS: usize = 4;

/// Encoded size of one per-chip sample in the bulk buffer.
pub const BYTES_PER_SAMPLE: usize = 4;

// Both HX711 and HX717 specify 200ns minimum clock high and low times.
const MIN_PULSE_NS: u32 = 200;

const SAMPLE_BITS: u32 = 24;
const SAMPLE_MAX: i32 = 0x7F_FFFF;
const SAMPLE_MIN: i32 = -0x7F_FFFF;

/// One physical chip: a data-out input pin and a clock output pin.
///
/// Construct the clock pin driven low (run mode). Pins are owned
/// exclusively; chips on one instance must not share pins.
pub struct Chip<Din, Sclk> {
    dout: Din,
    sclk: Sclk,
}

impl<Din: InputPin, Sclk: OutputPin> Chip<Din, Sclk> {
    pub fn new(dout: Din, sclk: Sclk) -> Self {
        Chip { dout, sclk }
    }

    fn dout_high(&mut self) -> Result<bool, Fault> {
        self.dout.is_high().map_err(|_| Fault::DataPin)
    }

    fn sclk_write(&mut self, high: bool) -> Result<(), Fault> {
        let res = if high {
            self.sclk.set_high()
        } else {
            self.sclk.set_low()
        };
        res.map_err(|_| Fault::ClockPin)
    }
}

/// Static misconfiguration, rejected before any pin is touched.
///
/// The chip set and gain selection are wiring facts fixed at
/// configuration time; the caller should treat this as fatal for the
/// subsystem rather than retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// No chips were supplied.
    NoChips,
    /// Gain/channel selection outside 1..=4.
    GainChannelOutOfRange,
}

/// A failed read. All variants are recovered by resetting the chips;
/// none are surfaced to the host as command errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// A data pin read failed.
    DataPin,
    /// A clock pin write failed.
    ClockPin,
    /// The read overran its rest-interval budget, usually because an
    /// interrupt storm stretched the clock sequence.
    Timing,
    /// A value fell outside the signed 24-bit range, or a data pin did
    /// not return high after the clock sequence.
    Decode,
}

/// One completed lock-step read.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SampleSet {
    /// Per-chip signed counts, in chip order.
    pub counts: Vec<i32, MAX_CHIPS>,
    /// Sum of all per-chip counts.
    pub total: i32,
    /// Timestamp taken just before the first clock pulse.
    pub timestamp: Ticks,
}

/// Outcome of a read attempt that did not fault.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadOutcome {
    /// At least one chip is still converting; retry on the next task
    /// pass rather than immediately.
    NotReady,
    Complete(SampleSet),
}

/// A group of 1-4 HX71x chips read in lock-step.
pub struct Hx71x<Din, Sclk, T> {
    chips: Vec<Chip<Din, Sclk>, MAX_CHIPS>,
    gain_channel: u8,
    time: T,
    min_pulse: Ticks,
    reset_required: bool,
}

impl<Din, Sclk, T> Hx71x<Din, Sclk, T>
where
    Din: InputPin,
    Sclk: OutputPin,
    T: TimeSource,
{
    /// Build a sensor from its wired chips.
    ///
    /// `gain_channel` is the number of trailer pulses (1-4) appended
    /// after the data bits to select gain and input channel for the
    /// next conversion. Validation happens before any pin is touched.
    /// `reset_required` starts set and is cleared only by a full
    /// successful read.
    pub fn new(
        chips: Vec<Chip<Din, Sclk>, MAX_CHIPS>,
        gain_channel: u8,
        time: T,
    ) -> Result<Self, ConfigError> {
        if chips.is_empty() {
            return Err(ConfigError::NoChips);
        }
        if !(1..=4).contains(&gain_channel) {
            return Err(ConfigError::GainChannelOutOfRange);
        }
        let min_pulse = time.ticks_from_nanos(MIN_PULSE_NS);
        Ok(Hx71x {
            chips,
            gain_channel,
            time,
            min_pulse,
            reset_required: true,
        })
    }

    pub fn chip_count(&self) -> usize {
        self.chips.len()
    }

    /// True until a full read succeeds after configuration, stop or a
    /// fault; sampled data is not trusted while set.
    pub fn reset_required(&self) -> bool {
        self.reset_required
    }

    pub(crate) fn require_reset(&mut self) {
        self.reset_required = true;
    }

    /// Current timer value, for collaborators scheduling against the
    /// same clock.
    pub fn now(&mut self) -> Ticks {
        self.time.now()
    }

    /// All chips have a conversion ready once every data pin is low.
    pub fn is_data_ready(&mut self) -> Result<bool, Fault> {
        for chip in &mut self.chips {
            if chip.dout_high()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Drive every clock pin high, the chips' reset/power-down level,
    /// and mark the instance as needing a restart.
    ///
    /// The level must be held for 60us (HX711) or 100us (HX717); the
    /// host round-trip before the next start exceeds both.
    pub fn reset_pins(&mut self) -> Result<(), Fault> {
        self.reset_required = true;
        for chip in &mut self.chips {
            chip.sclk_write(true)?;
        }
        Ok(())
    }

    /// Drive every clock pin low (run mode), in case the chips were
    /// held in reset.
    pub fn run(&mut self) -> Result<(), Fault> {
        for chip in &mut self.chips {
            chip.sclk_write(false)?;
        }
        Ok(())
    }

    /// Bytes of sample data a read would produce right now, without
    /// clocking anything out. Zero while a reset is pending.
    pub fn pending_sample_bytes(&mut self) -> Result<usize, Fault> {
        if self.reset_required {
            return Ok(0);
        }
        if self.is_data_ready()? {
            Ok(BYTES_PER_SAMPLE * self.chips.len())
        } else {
            Ok(0)
        }
    }

    // Pulse every clock pin high then low. The high phase runs under a
    // critical section so an interrupt cannot stretch it past the
    // chips' tolerance.
    fn pulse_clocks(&mut self) -> Result<(), Fault> {
        critical_section::with(|_| {
            let start = self.time.now();
            for chip in &mut self.chips {
                chip.sclk_write(true)?;
            }
            time::spin_wait_masked(&mut self.time, start, self.min_pulse);
            for chip in &mut self.chips {
                chip.sclk_write(false)?;
            }
            Ok(())
        })
    }

    /// Attempt one full acquisition cycle.
    ///
    /// `budget` is the rest interval in ticks. A read that takes at
    /// least this long was stretched by interrupts or fed by a
    /// desynchronized chip; its data is discarded and the caller must
    /// reset the chips.
    pub fn try_read(&mut self, budget: Ticks) -> Result<ReadOutcome, Fault> {
        if !self.is_data_ready()? {
            return Ok(ReadOutcome::NotReady);
        }

        let mut raw = [0i32; MAX_CHIPS];
        let start = self.time.now();
        for _ in 0..SAMPLE_BITS {
            self.pulse_clocks()?;
            let low_start = self.time.now();
            time::spin_wait(&mut self.time, low_start, self.min_pulse);
            for (acc, chip) in raw.iter_mut().zip(self.chips.iter_mut()) {
                *acc = (*acc << 1) | i32::from(chip.dout_high()?);
            }
        }

        // 1-4 extra pulses select gain and channel for the next
        // conversion; no data is clocked out.
        for _ in 0..self.gain_channel {
            self.pulse_clocks()?;
            let low_start = self.time.now();
            time::spin_wait(&mut self.time, low_start, self.min_pulse);
        }

        if time::elapsed(start, self.time.now(), budget) {
            return Err(Fault::Timing);
        }

        let mut counts: Vec<i32, MAX_CHIPS> = Vec::new();
        let mut total = 0i32;
        for (chip, &bits) in self.chips.iter_mut().zip(raw.iter()) {
            let mut value = bits;
            if value >= 0x80_0000 {
                // extend two's complement 24 bits to 32
                value |= !0xFF_FFFF;
            }
            // The data pin goes high once the chip leaves the
            // data-ready window; still-low means a desynchronized or
            // glitched read.
            if !chip.dout_high()? || !(SAMPLE_MIN..=SAMPLE_MAX).contains(&value) {
                return Err(Fault::Decode);
            }
            total += value;
            counts.push(value).ok();
        }

        self.reset_required = false;
        Ok(ReadOutcome::Complete(SampleSet {
            counts,
            total,
            timestamp: start,
        }))
    }
}
