use std::sync::Arc;
use std::time::Duration;

use embedded_hal::digital::v2::OutputPin;

use crate::bus::{self, completion::WaitError, BusConfig, Spi, Transfer, TransferRouter};
use crate::delay::Clock;
use crate::sd::command::Command;
use crate::sd::response::R1;
use crate::sd::transfer::{self, Token};
use crate::sd::BLOCK_SIZE;
use crate::timeout::TimeoutWindow;

#[derive(Debug)]
pub enum Error<SPI, CS> {
    SPI(SPI),
    CS(CS),
}

pub type BUSError<SPI, CS> = bus::Error<Error<SPI, CS>>;

/// Polls of the response byte after a command frame.
const NCR_MAX: usize = 10;
pub(crate) const READY_TIMEOUT_MS: u32 = 100;
const DATA_START_TIMEOUT_MS: u32 = 200;

pub struct Bus<SPI, CS, C> {
    spi: SPI,
    cs: CS,
    pub(crate) clock: C,
    router: Arc<TransferRouter>,
    transfer_timeout: Option<Duration>,
    touched: bool,
}

impl<E, F, SPI, CS, C> Bus<SPI, CS, C>
where
    SPI: Spi<Error = E>,
    CS: OutputPin<Error = F>,
    C: Clock,
{
    pub fn with_router(spi: SPI, cs: CS, clock: C, router: Arc<TransferRouter>) -> Self {
        Self { spi, cs, clock, router, transfer_timeout: None, touched: false }
    }

    pub(crate) fn set_transfer_timeout(&mut self, timeout_ms: Option<u32>) {
        self.transfer_timeout = timeout_ms.map(|ms| Duration::from_millis(ms as u64));
    }

    pub(crate) fn configure(&mut self, clock_hz: u32) -> Result<(), BUSError<E, F>> {
        trace!("Configure bus at {}Hz", clock_hz);
        self.spi.configure(&BusConfig::sdmmc(clock_hz)).map_err(|e| BUSError::BUS(Error::SPI(e)))
    }

    /// Deselects the card if anything went over the bus since the last
    /// release.
    pub(crate) fn release(&mut self) -> Result<(), BUSError<E, F>> {
        if !self.touched {
            return Ok(());
        }
        let result = self.deselect();
        self.touched = false;
        result
    }

    pub(crate) fn xchg(&mut self, byte: u8) -> Result<u8, BUSError<E, F>> {
        self.touched = true;
        self.spi.exchange(byte).map_err(|e| BUSError::BUS(Error::SPI(e)))
    }

    pub(crate) fn rx(&mut self, buffer: &mut [u8]) -> Result<(), BUSError<E, F>> {
        for byte in buffer.iter_mut() {
            *byte = self.xchg(0xFF)?;
        }
        Ok(())
    }

    pub(crate) fn skip(&mut self, num_bytes: usize) -> Result<(), BUSError<E, F>> {
        for _ in 0..num_bytes {
            self.xchg(0xFF)?;
        }
        Ok(())
    }

    /// Buffer transfer through the completion bridge, blocks until done.
    pub(crate) fn transfer(&mut self, transfer: Transfer<'_>) -> Result<(), BUSError<E, F>> {
        self.touched = true;
        let peripheral = self.spi.peripheral();
        let (done, pending) = self.router.register(peripheral).ok_or(BUSError::Busy)?;
        self.spi.start_transfer(transfer, done).map_err(|e| BUSError::BUS(Error::SPI(e)))?;
        pending.wait(self.transfer_timeout).map_err(|e| match e {
            WaitError::TimedOut => BUSError::Timeout,
            WaitError::Abandoned => BUSError::Generic,
        })
    }

    pub(crate) fn wait_ready(&mut self, timeout_ms: u32) -> Result<(), BUSError<E, F>> {
        let window = TimeoutWindow::start(&mut self.clock, timeout_ms);
        loop {
            if self.xchg(0xFF)? == 0xFF {
                return Ok(());
            }
            if window.expired(&mut self.clock) {
                debug!("Card still busy after {}ms", timeout_ms);
                return Err(BUSError::Timeout);
            }
        }
    }

    pub(crate) fn select(&mut self) -> Result<(), BUSError<E, F>> {
        self.touched = true;
        self.cs.set_low().map_err(|e| BUSError::BUS(Error::CS(e)))?;
        self.xchg(0xFF)?; // Dummy clock, force DO enabled
        match self.wait_ready(READY_TIMEOUT_MS) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.deselect()?;
                Err(e)
            }
        }
    }

    pub(crate) fn deselect(&mut self) -> Result<(), BUSError<E, F>> {
        self.cs.set_high().map_err(|e| BUSError::BUS(Error::CS(e)))?;
        self.xchg(0xFF)?; // Extra byte to release MISO
        Ok(())
    }

    /// Returns the raw R1, or `R1::NONE` when the card never answers.
    pub(crate) fn send_command(&mut self, cmd: Command) -> Result<R1, BUSError<E, F>> {
        if cmd.is_app() {
            let r1 = self.send_command(Command::AppCommand)?;
            if r1.0 > 1 {
                return Ok(r1);
            }
        }

        if cmd != Command::StopTransmission {
            self.deselect()?;
            match self.select() {
                Ok(()) => (),
                Err(BUSError::Timeout) => return Ok(R1::NONE),
                Err(e) => return Err(e),
            }
        }

        let bytes: [u8; 6] = cmd.into();
        for &byte in bytes.iter() {
            self.xchg(byte)?;
        }
        if cmd == Command::StopTransmission {
            self.xchg(0xFF)?; // Skip stuff byte
        }

        // Skip Ncr, 0~8 bytes for SDC, 1~8 bytes for MMC
        let mut r1 = R1::NONE;
        for _ in 0..NCR_MAX {
            r1 = R1(self.xchg(0xFF)?);
            if r1.valid() {
                break;
            }
        }
        trace!("CMD{} arg {:#010x} -> R1 {:#04x}", cmd.index(), cmd.argument(), r1.0);
        Ok(r1)
    }

    /// Same as `send_command` but a non-zero R1 is an error.
    pub(crate) fn command(&mut self, cmd: Command) -> Result<(), BUSError<E, F>> {
        match self.send_command(cmd)? {
            r1 if r1.ready() => Ok(()),
            r1 if !r1.valid() => Err(BUSError::NoResponse),
            r1 => {
                debug!("CMD{} rejected, R1 {:#04x} {:?}", cmd.index(), r1.0, r1.error());
                Err(BUSError::Command(r1))
            }
        }
    }

    /// Sends one data packet, `block` is ignored for the stop token.
    pub(crate) fn send_data_block(
        &mut self,
        block: Option<&[u8]>,
        token: Token,
    ) -> Result<(), BUSError<E, F>> {
        self.wait_ready(READY_TIMEOUT_MS)?;
        self.xchg(token as u8)?;
        if token == Token::Stop {
            return Ok(());
        }
        let block = block.filter(|b| b.len() == BLOCK_SIZE).ok_or(BUSError::Generic)?;
        self.transfer(Transfer::Write(block))?;
        self.skip(2)?; // Dummy CRC
        let byte = self.xchg(0xFF)?;
        match transfer::Response::try_from(byte) {
            Some(transfer::Response::Accepted) => Ok(()),
            Some(response) => {
                debug!("Data block rejected: {:?}", response);
                Err(BUSError::Transfer(transfer::TokenError::Generic))
            }
            None => Err(BUSError::Generic),
        }
    }

    pub(crate) fn receive_data_block(&mut self, buffer: &mut [u8]) -> Result<(), BUSError<E, F>> {
        self.receive_partial_block(buffer, 0)
    }

    /// Reads the head of a data packet into `buffer` and drops the
    /// `trailing` bytes after it.
    pub(crate) fn receive_partial_block(
        &mut self,
        buffer: &mut [u8],
        trailing: usize,
    ) -> Result<(), BUSError<E, F>> {
        let window = TimeoutWindow::start(&mut self.clock, DATA_START_TIMEOUT_MS);
        let byte = loop {
            let byte = self.xchg(0xFF)?;
            if byte != 0xFF || window.expired(&mut self.clock) {
                break byte;
            }
        };
        match Token::try_from(byte) {
            Ok(Token::Start) => (),
            Ok(_) => return Err(BUSError::Generic),
            Err(transfer::TokenError::NotToken) if byte == 0xFF => return Err(BUSError::Timeout),
            Err(e) => return Err(BUSError::Transfer(e)),
        }
        self.transfer(Transfer::Read(buffer))?;
        self.skip(trailing + 2) // Discard CRC
    }
}
