use core::convert::Infallible;
use core::sync::atomic::{AtomicU8, Ordering};

use embedded_hal::digital::v2::InputPin;

use crate::disk::DriveStatus;

/// Placeholder for an input that isn't wired, always reads low.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoPin;

impl InputPin for NoPin {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(false)
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        Ok(true)
    }
}

/// Digital input with configurable polarity.
pub struct Detect<P> {
    pin: P,
    active_low: bool,
}

impl<P: InputPin> Detect<P> {
    pub fn new(pin: P, active_low: bool) -> Self {
        Self { pin, active_low }
    }

    /// A pin that can't be read counts as inactive.
    pub fn is_active(&self) -> bool {
        let level = match self.active_low {
            true => self.pin.is_low(),
            false => self.pin.is_high(),
        };
        level.unwrap_or(false)
    }
}

/// Status bits kept outside the operation lock, so they can be read while a
/// card operation is running.
pub struct StatusTracker<CD, WP> {
    card_detect: Option<Detect<CD>>,
    write_protect: Option<Detect<WP>>,
    status: AtomicU8,
}

impl<CD: InputPin, WP: InputPin> StatusTracker<CD, WP> {
    pub fn new(card_detect: Option<Detect<CD>>, write_protect: Option<Detect<WP>>) -> Self {
        let status = AtomicU8::new(DriveStatus::NOT_INITIALIZED.bits());
        Self { card_detect, write_protect, status }
    }

    /// Without a card-detect input a card is assumed present.
    pub fn card_present(&self) -> bool {
        self.card_detect.as_ref().map(Detect::is_active).unwrap_or(true)
    }

    pub fn write_protected(&self) -> bool {
        self.write_protect.as_ref().map(Detect::is_active).unwrap_or(false)
    }

    fn insert(&self, bits: DriveStatus) {
        self.status.fetch_or(bits.bits(), Ordering::AcqRel);
    }

    fn remove(&self, bits: DriveStatus) {
        self.status.fetch_and(!bits.bits(), Ordering::AcqRel);
    }

    /// Re-reads both inputs into the cached status.
    pub fn refresh(&self) -> DriveStatus {
        match self.card_present() {
            true => self.remove(DriveStatus::NO_DISK),
            false => self.insert(DriveStatus::NO_DISK | DriveStatus::NOT_INITIALIZED),
        }
        match self.write_protected() {
            true => self.insert(DriveStatus::WRITE_PROTECTED),
            false => self.remove(DriveStatus::WRITE_PROTECTED),
        }
        DriveStatus::from_bits_truncate(self.status.load(Ordering::Acquire))
    }

    pub fn mark_initialized(&self) {
        self.remove(DriveStatus::NOT_INITIALIZED);
    }

    pub fn mark_uninitialized(&self) {
        self.insert(DriveStatus::NOT_INITIALIZED);
    }
}
