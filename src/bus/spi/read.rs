use embedded_hal::digital::v2::OutputPin;

use super::bus::{BUSError, Bus};
use crate::{
    bus::Spi,
    delay::Clock,
    sd::{command::Command, Card, BLOCK_SIZE},
};

impl<E, F, SPI, CS, C> Bus<SPI, CS, C>
where
    SPI: Spi<Error = E>,
    CS: OutputPin<Error = F>,
    C: Clock,
{
    /// Reads `buffer.len() / BLOCK_SIZE` sectors one CMD17 at a time,
    /// stopping at the first failed sector.
    pub(crate) fn read_sectors(
        &mut self,
        card: Card,
        sector: u32,
        buffer: &mut [u8],
    ) -> Result<(), BUSError<E, F>> {
        let mut address = card.address(sector).ok_or(BUSError::Generic)?;
        for block in buffer.chunks_exact_mut(BLOCK_SIZE) {
            self.command(Command::ReadSingleBlock(address))?;
            self.receive_data_block(block)?;
            address = address.wrapping_add(card.address_step());
        }
        Ok(())
    }
}
