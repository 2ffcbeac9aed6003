use core::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use embedded_hal::digital::v2::OutputPin;

use crate::bus::spi::BUSError;
use crate::bus::Spi;
use crate::delay::Clock;
use crate::Inner;

/// Exclusive access to the peripheral and to one driver instance, releases
/// the bus on drop.
pub(crate) struct Guard<'a, SPI, CS, C>
where
    SPI: Spi,
    CS: OutputPin,
    C: Clock,
{
    inner: MutexGuard<'a, Inner<SPI, CS, C>>,
    _bus: MutexGuard<'a, ()>,
    busy: &'a AtomicBool,
}

impl<'a, SPI, CS, C> Guard<'a, SPI, CS, C>
where
    SPI: Spi,
    CS: OutputPin,
    C: Clock,
{
    /// `bus` is taken before the driver state, always in that order.
    pub(crate) fn acquire(
        bus: MutexGuard<'a, ()>,
        mutex: &'a Mutex<Inner<SPI, CS, C>>,
        busy: &'a AtomicBool,
        busy_check: &AtomicBool,
    ) -> Self {
        // A panic mid-operation leaves nothing half-written in `Inner`
        let inner = mutex.lock().unwrap_or_else(PoisonError::into_inner);
        busy.store(true, Ordering::Release);
        busy_check.store(true, Ordering::Release);
        Self { inner, _bus: bus, busy }
    }

    /// Re-applies the active clock, SPI mode 0 and MSB first.
    pub(crate) fn activate(&mut self) -> Result<(), BUSError<SPI::Error, CS::Error>> {
        let clock_hz = self.inner.clock_hz();
        self.inner.bus.configure(clock_hz)
    }
}

impl<SPI, CS, C> Deref for Guard<'_, SPI, CS, C>
where
    SPI: Spi,
    CS: OutputPin,
    C: Clock,
{
    type Target = Inner<SPI, CS, C>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<SPI, CS, C> DerefMut for Guard<'_, SPI, CS, C>
where
    SPI: Spi,
    CS: OutputPin,
    C: Clock,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<SPI, CS, C> Drop for Guard<'_, SPI, CS, C>
where
    SPI: Spi,
    CS: OutputPin,
    C: Clock,
{
    fn drop(&mut self) {
        if self.inner.bus.release().is_err() {
            warn!("Failed to deselect card");
        }
        self.busy.store(false, Ordering::Release);
    }
}
