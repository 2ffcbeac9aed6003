use core::fmt::Debug;

pub use embedded_hal::spi::{Mode, MODE_0};

use crate::sd::response::R1;
use crate::sd::transfer::TokenError;

pub mod completion;
#[cfg(feature = "linux-spi")]
pub mod linux;
pub mod spi;

pub use completion::{Completion, TransferRouter};

#[derive(Debug)]
pub enum Error<BUS> {
    BUS(BUS),
    NoResponse,            // Probably no card
    Command(R1),           // Command rejected
    Transfer(TokenError),  // R/W error
    Timeout,               // No respond within expected duration
    Busy,                  // Peripheral already has a transfer in flight
    Generic,               // Unexpected error
}

/// Physical SPI peripheral, the key completions are routed by.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Peripheral {
    SPI,
    SPI1,
}

impl Peripheral {
    pub(crate) fn index(self) -> usize {
        match self {
            Self::SPI => 0,
            Self::SPI1 => 1,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

/// Settings re-applied every time a driver takes the bus.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub clock_hz: u32,
    pub mode: Mode,
    pub bit_order: BitOrder,
}

impl BusConfig {
    pub fn sdmmc(clock_hz: u32) -> Self {
        Self { clock_hz, mode: MODE_0, bit_order: BitOrder::MsbFirst }
    }
}

/// Buffer phase of an asynchronous transfer.
pub enum Transfer<'a> {
    Write(&'a [u8]),
    /// Clocks out 0xFF while filling the buffer.
    Read(&'a mut [u8]),
}

impl Transfer<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Write(tx) => tx.len(),
            Self::Read(rx) => rx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// SPI peripheral supplied by the host platform.
pub trait Spi {
    type Error: Debug;

    fn peripheral(&self) -> Peripheral;

    fn configure(&mut self, config: &BusConfig) -> Result<(), Self::Error>;

    /// Blocking full duplex exchange of a single byte.
    fn exchange(&mut self, byte: u8) -> Result<u8, Self::Error>;

    /// Starts a DMA style buffer transfer.
    ///
    /// `done` must be completed once the buffer is no longer accessed, either
    /// from this call or later from interrupt context. Dropping it without
    /// completing marks the transfer as failed.
    fn start_transfer(&mut self, transfer: Transfer<'_>, done: Completion) -> Result<(), Self::Error>;
}
