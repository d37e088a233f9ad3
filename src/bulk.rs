//! Bounded sample buffering and the host-facing sink boundaries.

use heapless::Vec;

use crate::hx71x::{SampleSet, BYTES_PER_SAMPLE};
use crate::time::Ticks;

/// Payload bytes carried per bulk report.
pub const BUFFER_CAPACITY: usize = 52;

/// Host transport boundary: an append-only report channel with
/// host-driven flush cadence. Wire framing lives behind this trait.
pub trait Transport {
    /// Ship one block of buffered samples to the host.
    fn send_samples(&mut self, sequence: u16, data: &[u8]);

    /// Tell the host the chips were reset, so it can tell a transient
    /// fault apart from normal operation.
    fn notify_reset(&mut self);

    /// Answer a status query: how long the probe itself took, how many
    /// bytes sit in the buffer and how many bytes a read would yield
    /// right now.
    fn send_status(&mut self, elapsed: Ticks, buffered: usize, pending: usize);
}

/// Force-trigger consumer fed the fused total of every successful
/// read, exactly once per read. Used for load cell probing.
pub trait LoadCellEndstop {
    fn report_sample(&mut self, total: i32, timestamp: Ticks);
}

/// Endstop slot for instances without a force trigger attached.
pub struct NoEndstop;

impl LoadCellEndstop for NoEndstop {
    fn report_sample(&mut self, _total: i32, _timestamp: Ticks) {}
}

/// Bounded sample accumulator flushed through a [`Transport`].
///
/// Only ever holds whole multi-chip records: one read appends
/// `4 * chip_count` bytes atomically, flushing first when the record
/// would not fit.
pub struct SampleBuffer {
    data: Vec<u8, BUFFER_CAPACITY>,
    sequence: u16,
}

impl SampleBuffer {
    pub const fn new() -> Self {
        SampleBuffer {
            data: Vec::new(),
            sequence: 0,
        }
    }

    /// Discard buffered data and restart the report sequence.
    pub fn reset(&mut self) {
        self.data.clear();
        self.sequence = 0;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Send everything buffered so far as one report.
    pub fn flush<Tr: Transport>(&mut self, transport: &mut Tr) {
        if self.data.is_empty() {
            return;
        }
        transport.send_samples(self.sequence, &self.data);
        self.sequence = self.sequence.wrapping_add(1);
        self.data.clear();
    }

    /// Append one completed read as an atomic record and forward the
    /// fused total to the endstop, if one is attached.
    pub fn emit<Tr, E>(
        &mut self,
        samples: &SampleSet,
        transport: &mut Tr,
        endstop: Option<&mut E>,
    ) where
        Tr: Transport,
        E: LoadCellEndstop,
    {
        let record = BYTES_PER_SAMPLE * samples.counts.len();
        if self.data.len() + record > self.data.capacity() {
            self.flush(transport);
        }
        for count in &samples.counts {
            // cannot fail: a record is at most 16 bytes and the buffer
            // was just flushed if it lacked room
            self.data.extend_from_slice(&count.to_le_bytes()).ok();
        }
        if let Some(endstop) = endstop {
            endstop.report_sample(samples.total, samples.timestamp);
        }
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}
