use embedded_hal::digital::v2::OutputPin;

use super::bus::{BUSError, Bus};
use crate::{
    bus::Spi,
    delay::Clock,
    sd::{
        command::{AppCommand, Command},
        registers::{SDStatus, CSD},
        Card, CardType,
    },
};

const ERASE_TIMEOUT_MS: u32 = 30_000;
const SD_STATUS_SIZE: usize = 64;

impl<E, F, SPI, CS, C> Bus<SPI, CS, C>
where
    SPI: Spi<Error = E>,
    CS: OutputPin<Error = F>,
    C: Clock,
{
    pub(crate) fn read_csd_bytes(&mut self) -> Result<[u8; 16], BUSError<E, F>> {
        self.command(Command::SendCSD)?;
        let mut csd = [0u8; 16];
        self.receive_data_block(&mut csd)?;
        Ok(csd)
    }

    pub(crate) fn read_csd(&mut self) -> Result<CSD, BUSError<E, F>> {
        self.read_csd_bytes().map(CSD::from_bytes)
    }

    /// Erase unit in sectors.
    pub(crate) fn erase_block_size(&mut self, card: Card) -> Result<u32, BUSError<E, F>> {
        if card.kind == CardType::SD2 {
            self.command(Command::App(AppCommand::SDStatus))?;
            self.xchg(0xFF)?; // Second byte of R2
            let mut bytes = [0u8; 16];
            let trailing = SD_STATUS_SIZE - bytes.len();
            self.receive_partial_block(&mut bytes, trailing)?;
            return Ok(SDStatus::from_bytes(bytes).erase_block_size());
        }
        match self.read_csd()? {
            CSD::V1(csd) if card.kind == CardType::MMC => Ok(csd.mmc_erase_block_size()),
            CSD::V1(csd) => Ok(csd.sd_erase_block_size()),
            CSD::V2(_) => Err(BUSError::Generic),
        }
    }

    /// Erases sectors `start..=end`, the caller checks the range.
    pub(crate) fn erase(&mut self, card: Card, start: u32, end: u32) -> Result<(), BUSError<E, F>> {
        if !card.kind.is_sd() {
            debug!("Erase is only supported by SD cards");
            return Err(BUSError::Generic);
        }
        if !self.read_csd()?.sector_erase_supported() {
            debug!("Card does not allow sector erase");
            return Err(BUSError::Generic);
        }
        let start = card.address(start).ok_or(BUSError::Generic)?;
        let end = card.address(end).ok_or(BUSError::Generic)?;
        self.command(Command::EraseBlockStart(start))?;
        self.command(Command::EraseBlockEnd(end))?;
        self.command(Command::Erase)?;
        self.wait_ready(ERASE_TIMEOUT_MS)
    }
}

