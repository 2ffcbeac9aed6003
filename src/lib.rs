//! # sdspi
//!
//! > SD/MMC card driver over SPI, exposing the block device contract a FatFs
//! > style filesystem expects
//!
//! ## Using this crate
//!
//! Assuming you already have `SPI` struct which implements `sdspi::bus::Spi`
//!
//! ```rust,ignore
//! let driver = Builder::new(spi, cs, sdspi::delay::std::Clock::default())
//!     .card_detect(cd_pin, true)
//!     .build();
//! let status = driver.initialize();
//! if !status.is_empty() {
//!     return Err(format!("Card not ready: {:?}", status));
//! }
//! let mut sectors = 0u64;
//! driver.ioctl(Ioctl::GetSectorCount(&mut sectors)).map_err(|e| e.to_string())?;
//!
//! let mut buffer = [0u8; 512];
//! driver.read(&mut buffer, 0, 1).map_err(|e| e.to_string())?;
//! ```

#[macro_use]
extern crate log;
#[cfg(feature = "spidev")]
extern crate spidev;

pub mod bus;
pub mod config;
pub mod delay;
pub mod disk;
mod guard;
pub mod ram;
pub mod registry;
pub mod sd;
#[cfg(test)]
mod sim;
pub mod status;
pub mod timeout;

use core::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use embedded_hal::digital::v2::{InputPin, OutputPin};

use bus::spi::Bus;
use bus::{Peripheral, Spi, TransferRouter};
pub use config::Config;
use delay::Clock;
pub use disk::{BlockDevice, DiskError, DiskResult, DriveStatus, Ioctl, SECTOR_SIZE};
use guard::Guard;
pub use registry::DriveRegistry;
pub use sd::{Card, CardType};
use status::{Detect, NoPin, StatusTracker};

pub(crate) struct Inner<SPI, CS, C> {
    bus: Bus<SPI, CS, C>,
    card: Card,
    /// Whether the next lock applies the high speed clock.
    high_speed: bool,
    config: Config,
}

impl<SPI, CS, C> Inner<SPI, CS, C> {
    fn clock_hz(&self) -> u32 {
        match self.high_speed {
            true => self.config.high_speed_hz,
            false => self.config.low_speed_hz,
        }
    }
}

/// SD/MMC card on a SPI bus.
///
/// Every operation holds the bus lock of its peripheral and then an internal
/// lock, so a shared reference may be used from several threads and drivers
/// on the same peripheral never interleave.
pub struct SdSpi<SPI, CS, C, CD = NoPin, WP = NoPin> {
    inner: Mutex<Inner<SPI, CS, C>>,
    router: Arc<TransferRouter>,
    peripheral: Peripheral,
    tracker: StatusTracker<CD, WP>,
    busy: AtomicBool,
    busy_check: AtomicBool,
}

pub struct Builder<SPI, CS, C, CD = NoPin, WP = NoPin> {
    spi: SPI,
    cs: CS,
    clock: C,
    card_detect: Option<Detect<CD>>,
    write_protect: Option<Detect<WP>>,
    router: Option<Arc<TransferRouter>>,
    config: Config,
}

impl<SPI, CS, C> Builder<SPI, CS, C> {
    pub fn new(spi: SPI, cs: CS, clock: C) -> Self {
        Self {
            spi,
            cs,
            clock,
            card_detect: None,
            write_protect: None,
            router: None,
            config: Config::default(),
        }
    }
}

impl<SPI, CS, C, CD, WP> Builder<SPI, CS, C, CD, WP> {
    pub fn card_detect<P: InputPin>(self, pin: P, active_low: bool) -> Builder<SPI, CS, C, P, WP> {
        Builder {
            spi: self.spi,
            cs: self.cs,
            clock: self.clock,
            card_detect: Some(Detect::new(pin, active_low)),
            write_protect: self.write_protect,
            router: self.router,
            config: self.config,
        }
    }

    pub fn write_protect<P: InputPin>(self, pin: P, active_low: bool) -> Builder<SPI, CS, C, CD, P> {
        Builder {
            spi: self.spi,
            cs: self.cs,
            clock: self.clock,
            card_detect: self.card_detect,
            write_protect: Some(Detect::new(pin, active_low)),
            router: self.router,
            config: self.config,
        }
    }

    /// Peripheral table to use instead of `TransferRouter::shared()`.
    pub fn router(mut self, router: Arc<TransferRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }
}

impl<SPI, CS, C, CD, WP> Builder<SPI, CS, C, CD, WP>
where
    SPI: Spi,
    CS: OutputPin,
    C: Clock,
    CD: InputPin,
    WP: InputPin,
{
    pub fn build(self) -> SdSpi<SPI, CS, C, CD, WP> {
        let router = self.router.unwrap_or_else(TransferRouter::shared);
        let peripheral = self.spi.peripheral();
        let mut bus = Bus::with_router(self.spi, self.cs, self.clock, router.clone());
        bus.set_transfer_timeout(self.config.transfer_timeout_ms);
        let inner = Inner { bus, card: Card::UNKNOWN, high_speed: false, config: self.config };
        SdSpi {
            inner: Mutex::new(inner),
            router,
            peripheral,
            tracker: StatusTracker::new(self.card_detect, self.write_protect),
            busy: AtomicBool::new(false),
            busy_check: AtomicBool::new(false),
        }
    }
}

impl<SPI, CS, C> SdSpi<SPI, CS, C>
where
    SPI: Spi,
    CS: OutputPin,
    C: Clock,
{
    /// Driver without card-detect and write-protect inputs.
    pub fn new(spi: SPI, cs: CS, clock: C) -> Self {
        Builder::new(spi, cs, clock).build()
    }
}

impl<SPI, CS, C, CD, WP> SdSpi<SPI, CS, C, CD, WP>
where
    SPI: Spi,
    CS: OutputPin,
    CS::Error: Debug,
    C: Clock,
    CD: InputPin,
    WP: InputPin,
{
    fn lock(&self) -> Guard<'_, SPI, CS, C> {
        let bus = self.router.lock_bus(self.peripheral);
        Guard::acquire(bus, &self.inner, &self.busy, &self.busy_check)
    }

    /// Lock without the bus or marking the driver busy, for bookkeeping only.
    fn state(&self) -> MutexGuard<'_, Inner<SPI, CS, C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// SPI clock the next operation runs at.
    pub fn active_clock(&self) -> u32 {
        self.state().clock_hz()
    }

    /// Takes effect from the next operation.
    pub fn set_low_speed(&self, hz: u32) {
        self.state().config.low_speed_hz = hz;
    }

    /// Takes effect from the next operation after `initialize`.
    pub fn set_high_speed(&self, hz: u32) {
        self.state().config.high_speed_hz = hz;
    }

    /// Whether the driver held its lock since the previous call.
    pub fn was_busy_since_last_check(&self) -> bool {
        self.busy_check.swap(false, Ordering::AcqRel) | self.busy.load(Ordering::Acquire)
    }

    pub fn card(&self) -> Card {
        self.state().card
    }
}

fn collapse<E: Debug>(operation: &str, error: bus::Error<E>) -> DiskError {
    warn!("{} failed: {:?}", operation, error);
    DiskError::from(error)
}

impl<SPI, CS, C, CD, WP> BlockDevice for SdSpi<SPI, CS, C, CD, WP>
where
    SPI: Spi,
    CS: OutputPin,
    CS::Error: Debug,
    C: Clock,
    CD: InputPin,
    WP: InputPin,
{
    fn initialize(&self) -> DriveStatus {
        let mut guard = self.lock();
        if !self.tracker.card_present() {
            debug!("No card inserted");
            guard.card = Card::UNKNOWN;
            return self.tracker.refresh();
        }

        let config = guard.config;
        guard.high_speed = false;
        let result = guard.activate().and_then(|_| guard.bus.init(&config));
        let card = result.unwrap_or_else(|e| {
            warn!("Card init failed: {:?}", e);
            Card::UNKNOWN
        });
        guard.card = card;
        match card.known() {
            true => self.tracker.mark_initialized(),
            false => self.tracker.mark_uninitialized(),
        }
        guard.high_speed = true;
        self.tracker.refresh()
    }

    /// Reads the inputs without waiting for a running operation.
    fn status(&self) -> DriveStatus {
        self.tracker.refresh()
    }

    fn read(&self, buffer: &mut [u8], sector: u32, count: u32) -> DiskResult {
        let len = disk::sectors_len(buffer.len(), sector, count)?;
        let mut guard = self.lock();
        let status = self.tracker.refresh();
        if status.intersects(DriveStatus::NO_DISK | DriveStatus::NOT_INITIALIZED) {
            return Err(DiskError::NotReady);
        }
        let card = guard.card;
        card.address(sector + (count - 1)).ok_or(DiskError::ParamError)?;
        guard.activate().map_err(|e| collapse("Configure", e))?;
        guard.bus.read_sectors(card, sector, &mut buffer[..len]).map_err(|e| collapse("Read", e))
    }

    fn write(&self, buffer: &[u8], sector: u32, count: u32) -> DiskResult {
        let len = disk::sectors_len(buffer.len(), sector, count)?;
        let mut guard = self.lock();
        let status = self.tracker.refresh();
        if status.contains(DriveStatus::NO_DISK) {
            return Err(DiskError::NotReady);
        }
        if status.contains(DriveStatus::WRITE_PROTECTED) {
            return Err(DiskError::WriteProtected);
        }
        if status.contains(DriveStatus::NOT_INITIALIZED) {
            return Err(DiskError::NotReady);
        }
        let card = guard.card;
        card.address(sector + (count - 1)).ok_or(DiskError::ParamError)?;
        guard.activate().map_err(|e| collapse("Configure", e))?;
        guard.bus.write_sectors(card, sector, &buffer[..len]).map_err(|e| collapse("Write", e))
    }

    fn ioctl(&self, request: Ioctl<'_>) -> DiskResult {
        let mut guard = self.lock();
        let status = self.tracker.refresh();
        if status.intersects(DriveStatus::NO_DISK | DriveStatus::NOT_INITIALIZED) {
            return Err(DiskError::NotReady);
        }
        let card = guard.card;
        match request {
            Ioctl::GetCardType(kind) => {
                *kind = card.kind;
                return Ok(());
            }
            Ioctl::EraseSector { start, end } if start > end || card.address(end).is_none() => {
                return Err(DiskError::ParamError);
            }
            Ioctl::Other(code) => {
                debug!("Unsupported ioctl {}", code);
                return Err(DiskError::ParamError);
            }
            _ => (),
        }

        let code = request.code();
        guard.activate().map_err(|e| collapse("Configure", e))?;
        let result = match request {
            Ioctl::Sync => guard.bus.select(),
            Ioctl::GetSectorCount(count) => guard.bus.read_csd().map(|csd| *count = csd.num_blocks()),
            Ioctl::GetBlockSize(size) => guard.bus.erase_block_size(card).map(|n| *size = n),
            Ioctl::EraseSector { start, end } => guard.bus.erase(card, start, end),
            Ioctl::GetCsd(csd) => guard.bus.read_csd_bytes().map(|bytes| *csd = bytes),
            Ioctl::GetCardType(_) | Ioctl::Other(_) => Ok(()),
        };
        result.map_err(|e| {
            warn!("Ioctl {} failed: {:?}", code, e);
            DiskError::from(e)
        })
    }
}
