use embedded_hal::blocking::delay::DelayMs;

/// Millisecond tick source plus blocking delay, supplied by the host.
///
/// The tick counter is free running and may wrap around.
pub trait Clock: DelayMs<u32> {
    fn now_ms(&mut self) -> u32;
}

pub mod std {
    use std::{thread, time::Instant};

    use embedded_hal::blocking::delay::DelayMs;

    /// Ticks since construction, backed by `Instant`.
    pub struct Clock(Instant);

    impl Default for Clock {
        fn default() -> Self {
            Self(Instant::now())
        }
    }

    impl super::Clock for Clock {
        fn now_ms(&mut self) -> u32 {
            self.0.elapsed().as_millis() as u32
        }
    }

    impl DelayMs<u32> for Clock {
        fn delay_ms(&mut self, ms: u32) {
            thread::sleep(std::time::Duration::from_millis(ms as u64));
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use embedded_hal::blocking::delay::DelayMs;

    /// Advances one millisecond per reading, so bounded polls always end.
    pub struct Clock {
        pub now: u32,
    }

    impl Clock {
        pub fn starting_at(now: u32) -> Self {
            Self { now }
        }
    }

    impl Default for Clock {
        fn default() -> Self {
            Self::starting_at(0)
        }
    }

    impl super::Clock for Clock {
        fn now_ms(&mut self) -> u32 {
            self.now = self.now.wrapping_add(1);
            self.now
        }
    }

    impl DelayMs<u32> for Clock {
        fn delay_ms(&mut self, ms: u32) {
            self.now = self.now.wrapping_add(ms);
        }
    }
}
