use std::io;

use embedded_hal::spi::{Phase, Polarity};
use gpio::{sysfs::SysFsGpioOutput, GpioOut};
use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};

use crate::bus::{BitOrder, BusConfig, Completion, Peripheral, Spi, Transfer};
use crate::delay::std::Clock;
use crate::Builder;

/// spidev backed peripheral, buffer transfers complete before returning.
pub struct SPI {
    dev: Spidev,
    peripheral: Peripheral,
}

impl SPI {
    pub fn new(spi: &str, peripheral: Peripheral) -> io::Result<Self> {
        Ok(Self { dev: Spidev::open(spi)?, peripheral })
    }
}

impl Spi for SPI {
    type Error = io::Error;

    fn peripheral(&self) -> Peripheral {
        self.peripheral
    }

    fn configure(&mut self, config: &BusConfig) -> io::Result<()> {
        let mode = match (config.mode.polarity, config.mode.phase) {
            (Polarity::IdleLow, Phase::CaptureOnFirstTransition) => SpiModeFlags::SPI_MODE_0,
            (Polarity::IdleLow, Phase::CaptureOnSecondTransition) => SpiModeFlags::SPI_MODE_1,
            (Polarity::IdleHigh, Phase::CaptureOnFirstTransition) => SpiModeFlags::SPI_MODE_2,
            (Polarity::IdleHigh, Phase::CaptureOnSecondTransition) => SpiModeFlags::SPI_MODE_3,
        };
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(config.clock_hz)
            .mode(mode)
            .lsb_first(config.bit_order == BitOrder::LsbFirst)
            .build();
        self.dev.configure(&options)
    }

    fn exchange(&mut self, byte: u8) -> io::Result<u8> {
        let mut rx = [0u8; 1];
        self.dev.transfer(&mut SpidevTransfer::read_write(&[byte], &mut rx))?;
        Ok(rx[0])
    }

    fn start_transfer(&mut self, transfer: Transfer<'_>, done: Completion) -> io::Result<()> {
        match transfer {
            Transfer::Write(tx) => self.dev.transfer(&mut SpidevTransfer::write(tx))?,
            Transfer::Read(rx) => {
                let tx = vec![0xFF; rx.len()];
                self.dev.transfer(&mut SpidevTransfer::read_write(&tx, rx))?
            }
        }
        done.complete();
        Ok(())
    }
}

pub struct GPIO(SysFsGpioOutput);

impl embedded_hal::digital::v2::OutputPin for GPIO {
    type Error = io::Error;

    fn set_high(&mut self) -> io::Result<()> {
        self.0.set_value(true)
    }

    fn set_low(&mut self) -> io::Result<()> {
        self.0.set_value(false)
    }
}

/// Driver builder for a spidev device with a sysfs GPIO as chip select.
pub fn builder(spi: &str, cs: u16) -> io::Result<Builder<SPI, GPIO, Clock>> {
    let spi = SPI::new(spi, Peripheral::SPI)?;
    let cs = SysFsGpioOutput::open(cs)?;
    Ok(Builder::new(spi, GPIO(cs), Clock::default()))
}
