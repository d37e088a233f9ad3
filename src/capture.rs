//! Periodic acquisition: a one-shot timer marks an instance pending
//! from interrupt context; a cooperative task drains pending instances
//! and resets the chips on any fault.
//!
//! A platform timer callback for an instance should do no more than
//! `bank.on_timer(handle)`, since the full read sequence is far too
//! long for interrupt context, and the main loop calls `bank.run()` on
//! every pass.

use embedded_hal::digital::{InputPin, OutputPin};
use heapless::Vec;

use crate::bulk::{LoadCellEndstop, SampleBuffer, Transport};
use crate::hx71x::{Fault, Hx71x, ReadOutcome};
use crate::time::{Ticks, TimeSource};

/// One-shot wake timer collaborator.
///
/// `arm` schedules a callback at an absolute tick value on the same
/// clock as the instance's [`TimeSource`]; the callback must invoke
/// [`CaptureBank::on_timer`] for the instance. `cancel` guarantees no
/// further callback once it returns.
pub trait SampleTimer {
    fn arm(&mut self, waketime: Ticks);
    fn cancel(&mut self);
}

/// Stable handle into a [`CaptureBank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Handle(usize);

/// Work interface the capture task drives.
pub trait Capture {
    /// Interrupt-context timer callback body.
    fn on_timer(&mut self);
    /// A read is due or in progress.
    fn pending(&self) -> bool;
    /// One cooperative task pass.
    fn run_once(&mut self);
}

/// One sensor instance wired to its scheduling and host collaborators.
///
/// At most one read is ever in flight: the timer is re-armed only
/// after `run_once` finishes the current read or recovery, and
/// `run_once` takes `&mut self`.
pub struct Sampler<Din, Sclk, T, Tm, Tr, E> {
    adc: Hx71x<Din, Sclk, T>,
    timer: Tm,
    transport: Tr,
    endstop: Option<E>,
    buffer: SampleBuffer,
    rest_ticks: Ticks,
    pending: bool,
}

impl<Din, Sclk, T, Tm, Tr, E> Sampler<Din, Sclk, T, Tm, Tr, E>
where
    Din: InputPin,
    Sclk: OutputPin,
    T: TimeSource,
    Tm: SampleTimer,
    Tr: Transport,
    E: LoadCellEndstop,
{
    pub fn new(adc: Hx71x<Din, Sclk, T>, timer: Tm, transport: Tr, endstop: Option<E>) -> Self {
        Sampler {
            adc,
            timer,
            transport,
            endstop,
            buffer: SampleBuffer::new(),
            rest_ticks: 0,
            pending: false,
        }
    }

    /// Start periodic acquisition, or stop it when `rest_ticks` is 0.
    ///
    /// Stopping cancels the armed timer and clears `pending` inside
    /// one critical section, so a timer that already fired cannot
    /// resurrect the read loop; the chips are untrusted until the next
    /// start. Starting resets the buffer, puts the chips in run mode
    /// and arms the first cycle.
    pub fn start(&mut self, rest_ticks: Ticks) -> Result<(), Fault> {
        critical_section::with(|_| {
            self.timer.cancel();
            self.pending = false;
        });
        self.rest_ticks = rest_ticks;
        if rest_ticks == 0 {
            self.adc.require_reset();
            return Ok(());
        }
        self.buffer.reset();
        self.adc.run()?;
        self.schedule_next(false);
        Ok(())
    }

    /// Answer a status query without performing a read: reset-pending
    /// state and the bytes a read would yield right now.
    pub fn status(&mut self) {
        let start = self.adc.now();
        let pending_bytes = self.adc.pending_sample_bytes().unwrap_or(0);
        let elapsed = self.adc.now().wrapping_sub(start);
        self.transport
            .send_status(elapsed, self.buffer.len(), pending_bytes);
    }

    pub fn reset_required(&self) -> bool {
        self.adc.reset_required()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    // Arm the next cycle at now + rest. Flag and timer move together
    // under a critical section because the timer callback runs at
    // interrupt priority.
    fn schedule_next(&mut self, keep_pending: bool) {
        critical_section::with(|_| {
            self.pending = keep_pending;
            let waketime = self.adc.now().wrapping_add(self.rest_ticks);
            self.timer.arm(waketime);
        });
    }

    // Fault recovery: stop the schedule, hold the chips in reset and
    // notify the host. The timer stays unarmed until an explicit
    // restart.
    fn recover(&mut self) {
        critical_section::with(|_| {
            self.timer.cancel();
            self.pending = false;
        });
        // a failed clock write still leaves reset_required set
        let _ = self.adc.reset_pins();
        self.transport.notify_reset();
    }
}

impl<Din, Sclk, T, Tm, Tr, E> Capture for Sampler<Din, Sclk, T, Tm, Tr, E>
where
    Din: InputPin,
    Sclk: OutputPin,
    T: TimeSource,
    Tm: SampleTimer,
    Tr: Transport,
    E: LoadCellEndstop,
{
    fn on_timer(&mut self) {
        critical_section::with(|_| {
            self.pending = true;
        });
    }

    fn pending(&self) -> bool {
        self.pending
    }

    fn run_once(&mut self) {
        if !self.pending {
            return;
        }
        match self.adc.try_read(self.rest_ticks) {
            Ok(ReadOutcome::NotReady) => {
                // still converting; keep pending so the next task pass
                // retries without waiting out a full interval
                self.schedule_next(true);
            }
            Ok(ReadOutcome::Complete(samples)) => {
                self.buffer
                    .emit(&samples, &mut self.transport, self.endstop.as_mut());
                self.schedule_next(false);
            }
            Err(_) => self.recover(),
        }
    }
}

/// The firmware-owned instance table plus the capture task's wake
/// flag. Handles are stable small indexes assigned at configuration
/// time; instances are never removed.
pub struct CaptureBank<S, const N: usize> {
    samplers: Vec<S, N>,
    wake: bool,
}

impl<S: Capture, const N: usize> CaptureBank<S, N> {
    pub const fn new() -> Self {
        CaptureBank {
            samplers: Vec::new(),
            wake: false,
        }
    }

    /// Register an instance, returning its handle, or the instance
    /// back when the table is full.
    pub fn add(&mut self, sampler: S) -> Result<Handle, S> {
        let handle = Handle(self.samplers.len());
        match self.samplers.push(sampler) {
            Ok(()) => Ok(handle),
            Err(sampler) => Err(sampler),
        }
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut S> {
        self.samplers.get_mut(handle.0)
    }

    /// Timer-callback entry: mark the instance pending and request a
    /// task pass. Safe to call from interrupt context through the
    /// platform's shared-state wrapper.
    pub fn on_timer(&mut self, handle: Handle) {
        if let Some(sampler) = self.samplers.get_mut(handle.0) {
            sampler.on_timer();
        }
        critical_section::with(|_| {
            self.wake = true;
        });
    }

    fn check_wake(&mut self) -> bool {
        critical_section::with(|_| {
            let woken = self.wake;
            self.wake = false;
            woken
        })
    }

    /// Cooperative task body: if woken, one pass over every pending
    /// instance.
    pub fn run(&mut self) {
        if !self.check_wake() {
            return;
        }
        for sampler in &mut self.samplers {
            if sampler.pending() {
                sampler.run_once();
            }
        }
    }
}

impl<S: Capture, const N: usize> Default for CaptureBank<S, N> {
    fn default() -> Self {
        Self::new()
    }
}
