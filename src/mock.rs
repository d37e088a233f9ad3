//! Script-driven doubles for pins, the tick clock and the scheduler,
//! transport and endstop collaborators. Test-only.

use core::cell::RefCell;
use core::convert::Infallible;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::bulk::{LoadCellEndstop, Transport};
use crate::capture::SampleTimer;
use crate::time::{Ticks, TimeSource};

/// Input pin replaying a scripted level sequence; once the script is
/// exhausted the last level repeats.
#[derive(Clone)]
pub struct DoutPin {
    state: Rc<RefCell<DoutState>>,
}

struct DoutState {
    levels: VecDeque<bool>,
    last: bool,
    reads: usize,
}

impl DoutPin {
    pub fn new(levels: &[bool]) -> Self {
        DoutPin {
            state: Rc::new(RefCell::new(DoutState {
                levels: levels.iter().copied().collect(),
                last: false,
                reads: 0,
            })),
        }
    }

    pub fn push_level(&self, level: bool) {
        self.state.borrow_mut().levels.push_back(level);
    }

    pub fn reads(&self) -> usize {
        self.state.borrow().reads
    }
}

impl ErrorType for DoutPin {
    type Error = Infallible;
}

impl InputPin for DoutPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        let mut s = self.state.borrow_mut();
        s.reads += 1;
        if let Some(level) = s.levels.pop_front() {
            s.last = level;
        }
        Ok(s.last)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|v| !v)
    }
}

/// The level sequence one chip produces for a full read: data ready
/// (low), 24 data bits MSB first, then the post-sequence level.
pub fn dout_script(value: u32, post_high: bool) -> DoutPin {
    let mut levels = Vec::with_capacity(26);
    levels.push(false);
    for bit in (0..24).rev() {
        levels.push((value >> bit) & 1 == 1);
    }
    levels.push(post_high);
    DoutPin::new(&levels)
}

/// Output pin recording every write.
#[derive(Clone)]
pub struct SclkPin {
    state: Rc<RefCell<SclkState>>,
}

#[derive(Default)]
struct SclkState {
    level: bool,
    writes: usize,
    high_pulses: usize,
}

impl SclkPin {
    pub fn new() -> Self {
        SclkPin {
            state: Rc::new(RefCell::new(SclkState::default())),
        }
    }

    pub fn level(&self) -> bool {
        self.state.borrow().level
    }

    pub fn writes(&self) -> usize {
        self.state.borrow().writes
    }

    pub fn high_pulses(&self) -> usize {
        self.state.borrow().high_pulses
    }
}

impl ErrorType for SclkPin {
    type Error = Infallible;
}

impl OutputPin for SclkPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        let mut s = self.state.borrow_mut();
        s.writes += 1;
        s.level = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        let mut s = self.state.borrow_mut();
        s.writes += 1;
        if !s.level {
            s.high_pulses += 1;
        }
        s.level = true;
        Ok(())
    }
}

/// Tick source that advances by a fixed step on every `now` call, so
/// spin waits terminate deterministically. One tick per nanosecond.
#[derive(Clone)]
pub struct TestClock {
    state: Rc<RefCell<ClockState>>,
}

struct ClockState {
    now: Ticks,
    step: Ticks,
    polls: usize,
}

impl TestClock {
    pub fn new(start: Ticks, step: Ticks) -> Self {
        assert!(step > 0, "a zero step would spin forever");
        TestClock {
            state: Rc::new(RefCell::new(ClockState {
                now: start,
                step,
                polls: 0,
            })),
        }
    }

    pub fn polls(&self) -> usize {
        self.state.borrow().polls
    }
}

impl TimeSource for TestClock {
    fn now(&mut self) -> Ticks {
        let mut s = self.state.borrow_mut();
        let t = s.now;
        s.now = s.now.wrapping_add(s.step);
        t
    }

    fn ticks_from_nanos(&self, nanos: u32) -> Ticks {
        nanos
    }

    fn poll(&mut self) {
        self.state.borrow_mut().polls += 1;
    }
}

/// One-shot timer double recording arm/cancel traffic.
#[derive(Clone)]
pub struct TestTimer {
    state: Rc<RefCell<TimerState>>,
}

#[derive(Default)]
pub struct TimerState {
    pub armed: Option<Ticks>,
    pub arms: usize,
    pub cancels: usize,
}

impl TestTimer {
    pub fn new() -> Self {
        TestTimer {
            state: Rc::new(RefCell::new(TimerState::default())),
        }
    }

    pub fn armed(&self) -> Option<Ticks> {
        self.state.borrow().armed
    }

    pub fn arms(&self) -> usize {
        self.state.borrow().arms
    }

    pub fn cancels(&self) -> usize {
        self.state.borrow().cancels
    }
}

impl SampleTimer for TestTimer {
    fn arm(&mut self, waketime: Ticks) {
        let mut s = self.state.borrow_mut();
        s.armed = Some(waketime);
        s.arms += 1;
    }

    fn cancel(&mut self) {
        let mut s = self.state.borrow_mut();
        s.armed = None;
        s.cancels += 1;
    }
}

/// Host transport double capturing reports, resets and status replies.
#[derive(Clone)]
pub struct TestTransport {
    state: Rc<RefCell<TransportState>>,
}

#[derive(Default)]
pub struct TransportState {
    pub reports: Vec<(u16, Vec<u8>)>,
    pub resets: usize,
    pub statuses: Vec<(Ticks, usize, usize)>,
}

impl TestTransport {
    pub fn new() -> Self {
        TestTransport {
            state: Rc::new(RefCell::new(TransportState::default())),
        }
    }

    pub fn reports(&self) -> Vec<(u16, Vec<u8>)> {
        self.state.borrow().reports.clone()
    }

    pub fn resets(&self) -> usize {
        self.state.borrow().resets
    }

    pub fn statuses(&self) -> Vec<(Ticks, usize, usize)> {
        self.state.borrow().statuses.clone()
    }
}

impl Transport for TestTransport {
    fn send_samples(&mut self, sequence: u16, data: &[u8]) {
        self.state
            .borrow_mut()
            .reports
            .push((sequence, data.to_vec()));
    }

    fn notify_reset(&mut self) {
        self.state.borrow_mut().resets += 1;
    }

    fn send_status(&mut self, elapsed: Ticks, buffered: usize, pending: usize) {
        self.state
            .borrow_mut()
            .statuses
            .push((elapsed, buffered, pending));
    }
}

/// Endstop double capturing every forwarded fused total.
#[derive(Clone)]
pub struct TestEndstop {
    state: Rc<RefCell<Vec<(i32, Ticks)>>>,
}

impl TestEndstop {
    pub fn new() -> Self {
        TestEndstop {
            state: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn samples(&self) -> Vec<(i32, Ticks)> {
        self.state.borrow().clone()
    }
}

impl LoadCellEndstop for TestEndstop {
    fn report_sample(&mut self, total: i32, timestamp: Ticks) {
        self.state.borrow_mut().push((total, timestamp));
    }
}
