//! Tick-based time and the spin waits that hold HX71x clock timing.

/// Wrapping hardware timer ticks.
pub type Ticks = u32;

/// Monotonic tick counter driving all HX71x timing.
///
/// Implementations wrap an architecture timer. `poll` is called on
/// every iteration of [`spin_wait`] and may service deferred interrupt
/// work; the default does nothing.
///
/// A platform whose interrupt latency already exceeds the 200ns
/// minimum clock pulse may return 0 from `ticks_from_nanos` for such
/// short durations. Both spin waits then return immediately and pulse
/// timing is guaranteed by the surrounding critical section alone.
pub trait TimeSource {
    /// Current timer value.
    fn now(&mut self) -> Ticks;

    /// Convert a nanosecond duration to timer ticks.
    fn ticks_from_nanos(&self, nanos: u32) -> Ticks;

    /// Service pending work while busy-waiting with interrupts live.
    fn poll(&mut self) {}
}

/// True once `budget` ticks have passed since `start`.
#[inline]
pub fn elapsed(start: Ticks, now: Ticks, budget: Ticks) -> bool {
    now.wrapping_sub(start) >= budget
}

/// Busy-wait without servicing interrupts.
///
/// The caller must already hold a critical section; an interrupt
/// firing mid-pulse would stretch the pulse past the chips' tolerance.
/// Keep `budget` to the minimum pulse width.
#[inline]
pub fn spin_wait_masked<T: TimeSource>(time: &mut T, start: Ticks, budget: Ticks) {
    while !elapsed(start, time.now(), budget) {}
}

/// Busy-wait while letting the time source service interrupt work.
#[inline]
pub fn spin_wait<T: TimeSource>(time: &mut T, start: Ticks, budget: Ticks) {
    while !elapsed(start, time.now(), budget) {
        time.poll();
    }
}
