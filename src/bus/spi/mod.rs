pub mod bus;
pub mod control;
pub mod read;
pub mod write;

use embedded_hal::digital::v2::OutputPin;

use crate::{
    bus::Spi,
    config::Config,
    delay::Clock,
    sd::{
        command::{AppCommand, Command, SendInterfaceCondition},
        response::{R3, R7},
        Card, CardType, BLOCK_SIZE,
    },
    timeout::TimeoutWindow,
};
pub use bus::{BUSError, Bus, Error};

impl<E, F, SPI, CS, C> Bus<SPI, CS, C>
where
    SPI: Spi<Error = E>,
    CS: OutputPin<Error = F>,
    C: Clock,
{
    /// Probes the attached card, expects the bus running at low speed.
    ///
    /// Protocol failures yield `Card::UNKNOWN`, only errors of the SPI
    /// peripheral or the CS pin are returned as `Err`.
    pub fn init(&mut self, config: &Config) -> Result<Card, BUSError<E, F>> {
        // Supply minimum of 74 clock cycles without CS asserted.
        self.deselect()?;
        self.skip(10)?;

        let mut idle = false;
        for _ in 0..config.go_idle_attempts {
            if self.send_command(Command::GoIdleState)?.idle() {
                idle = true;
                break;
            }
            self.clock.delay_ms(1);
        }
        if !idle {
            debug!("No card entered idle state");
            return Ok(Card::UNKNOWN);
        }

        let window = TimeoutWindow::start(&mut self.clock, config.init_timeout_ms);
        let card = match self.send_command(Command::SendIfCond(SendInterfaceCondition::spi()))? {
            r1 if r1.idle() => self.init_sd2(&window)?,
            _ => self.init_legacy(&window)?,
        };
        debug!("Card: {:?}", card);
        Ok(card)
    }

    fn init_sd2(&mut self, window: &TimeoutWindow) -> Result<Card, BUSError<E, F>> {
        let mut bytes = [0u8; 4];
        self.rx(&mut bytes)?;
        let r7 = R7(u32::from_be_bytes(bytes));
        if !r7.voltage_accepted() || r7.echo_back_check_pattern() != 0xAA {
            debug!("Unusable R7 {:#010x}", r7.0);
            return Ok(Card::UNKNOWN);
        }
        if !self.poll_ready(Command::App(AppCommand::SDSendOpCond(true)), window)? {
            debug!("SD2 card did not leave idle state");
            return Ok(Card::UNKNOWN);
        }
        if !self.send_command(Command::ReadOCR)?.ready() {
            return Ok(Card::UNKNOWN);
        }
        self.rx(&mut bytes)?;
        let r3 = R3(u32::from_be_bytes(bytes));
        Ok(Card::new(CardType::SD2, r3.card_capacity_status()))
    }

    fn init_legacy(&mut self, window: &TimeoutWindow) -> Result<Card, BUSError<E, F>> {
        let (kind, cmd) = match self.send_command(Command::App(AppCommand::SDSendOpCond(false)))? {
            r1 if r1.0 <= 1 => (CardType::SD1, Command::App(AppCommand::SDSendOpCond(false))),
            _ => (CardType::MMC, Command::SendOpCond),
        };
        if !self.poll_ready(cmd, window)? {
            debug!("{:?} card did not leave idle state", kind);
            return Ok(Card::UNKNOWN);
        }
        if !self.send_command(Command::SetBlockLen(BLOCK_SIZE as u32))?.ready() {
            debug!("{:?} card rejected block length", kind);
            return Ok(Card::UNKNOWN);
        }
        Ok(Card::new(kind, false))
    }

    /// Repeats `cmd` until R1 reads 0, false once `window` expires.
    fn poll_ready(&mut self, cmd: Command, window: &TimeoutWindow) -> Result<bool, BUSError<E, F>> {
        loop {
            if self.send_command(cmd)?.ready() {
                return Ok(true);
            }
            if window.expired(&mut self.clock) {
                return Ok(false);
            }
            self.clock.delay_ms(1);
        }
    }
}
