use embedded_hal::digital::v2::OutputPin;

use super::bus::{BUSError, Bus};
use crate::{
    bus::Spi,
    delay::Clock,
    sd::{
        command::{AppCommand, Command},
        transfer::Token,
        Card, BLOCK_SIZE,
    },
};

impl<E, F, SPI, CS, C> Bus<SPI, CS, C>
where
    SPI: Spi<Error = E>,
    CS: OutputPin<Error = F>,
    C: Clock,
{
    pub(crate) fn write_sectors(
        &mut self,
        card: Card,
        sector: u32,
        buffer: &[u8],
    ) -> Result<(), BUSError<E, F>> {
        let address = card.address(sector).ok_or(BUSError::Generic)?;
        let count = buffer.len() / BLOCK_SIZE;
        if count == 1 {
            self.command(Command::WriteBlock(address))?;
            return self.send_data_block(Some(buffer), Token::Start);
        }

        if card.kind.is_sd() {
            // Pre-erase hint, a rejection here is harmless.
            let r1 = self.send_command(Command::App(AppCommand::SetWriteBlockEraseCount(count as u32)))?;
            if !r1.ready() {
                debug!("ACMD23 rejected, R1 {:#04x}", r1.0);
            }
        }
        self.command(Command::WriteMultipleBlock(address))?;
        let mut result = Ok(());
        for (i, block) in buffer.chunks_exact(BLOCK_SIZE).enumerate() {
            result = self.send_data_block(Some(block), Token::StartWriteMultipleBlock);
            if result.is_err() {
                debug!("Block {} of {} not accepted", i + 1, count);
                break;
            }
        }
        let stop = self.send_data_block(None, Token::Stop);
        result.and(stop)
    }
}
