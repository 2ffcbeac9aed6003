/// Driver tunables.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Clock used while probing the card, must stay within 100~400KHz.
    pub low_speed_hz: u32,
    pub high_speed_hz: u32,
    pub init_timeout_ms: u32,
    pub go_idle_attempts: u32,
    /// `None` waits for a transfer completion indefinitely.
    pub transfer_timeout_ms: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            low_speed_hz: 400_000,
            high_speed_hz: 15_000_000,
            init_timeout_ms: 1000,
            go_idle_attempts: 200,
            transfer_timeout_ms: None,
        }
    }
}

impl Config {
    pub fn low_speed(mut self, hz: u32) -> Self {
        self.low_speed_hz = hz;
        self
    }

    pub fn high_speed(mut self, hz: u32) -> Self {
        self.high_speed_hz = hz;
        self
    }

    pub fn init_timeout(mut self, ms: u32) -> Self {
        self.init_timeout_ms = ms;
        self
    }

    pub fn go_idle_attempts(mut self, attempts: u32) -> Self {
        self.go_idle_attempts = attempts;
        self
    }

    pub fn transfer_timeout(mut self, ms: Option<u32>) -> Self {
        self.transfer_timeout_ms = ms;
        self
    }
}
