use crate::delay::Clock;

/// Deadline for a bounded busy-poll.
#[derive(Copy, Clone, Debug)]
pub struct TimeoutWindow {
    start: u32,
    duration_ms: u32,
}

impl TimeoutWindow {
    pub fn start<C: Clock>(clock: &mut C, duration_ms: u32) -> Self {
        Self { start: clock.now_ms(), duration_ms }
    }

    pub fn elapsed<C: Clock>(&self, clock: &mut C) -> u32 {
        clock.now_ms().wrapping_sub(self.start)
    }

    pub fn expired<C: Clock>(&self, clock: &mut C) -> bool {
        self.elapsed(clock) > self.duration_ms
    }
}
