#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct SendInterfaceCondition {
    pub pcie_1_2v_suppport: bool, // PCIe 1.2V
    pub pcie_availability: bool,
    pub voltage_supplied: bool,
    pub check_pattern: u8,
}

impl SendInterfaceCondition {
    pub fn spi() -> Self {
        Self { voltage_supplied: true, check_pattern: 0xAA, ..Default::default() }
    }
}

impl From<SendInterfaceCondition> for u32 {
    fn from(cond: SendInterfaceCondition) -> u32 {
        (cond.pcie_1_2v_suppport as u32) << 15
            | (cond.pcie_availability as u32) << 14
            | (cond.voltage_supplied as u32) << 8
            | cond.check_pattern as u32
    }
}

pub type Address = u32;

/// Commands that must be preceded by APP_CMD (CMD55).
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AppCommand {
    SDStatus,
    SetWriteBlockEraseCount(u32),
    SDSendOpCond(bool), // host-capacity-support
}

impl AppCommand {
    pub fn index(self) -> u8 {
        match self {
            Self::SDStatus => 13,
            Self::SetWriteBlockEraseCount(_) => 23,
            Self::SDSendOpCond(_) => 41,
        }
    }

    pub fn argument(self) -> u32 {
        match self {
            Self::SDStatus => 0,
            Self::SetWriteBlockEraseCount(count) => count,
            Self::SDSendOpCond(hcs) => (hcs as u32) << 30,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Command {
    GoIdleState,
    SendOpCond,
    SendIfCond(SendInterfaceCondition),
    SendCSD,
    StopTransmission,
    SetBlockLen(u32),
    ReadSingleBlock(Address),
    WriteBlock(Address),
    WriteMultipleBlock(Address),
    EraseBlockStart(Address),
    EraseBlockEnd(Address),
    Erase,
    AppCommand,
    ReadOCR,
    App(AppCommand),
}

impl Command {
    pub fn index(self) -> u8 {
        match self {
            Self::GoIdleState => 0,
            Self::SendOpCond => 1,
            Self::SendIfCond(_) => 8,
            Self::SendCSD => 9,
            Self::StopTransmission => 12,
            Self::SetBlockLen(_) => 16,
            Self::ReadSingleBlock(_) => 17,
            Self::WriteBlock(_) => 24,
            Self::WriteMultipleBlock(_) => 25,
            Self::EraseBlockStart(_) => 32,
            Self::EraseBlockEnd(_) => 33,
            Self::Erase => 38,
            Self::AppCommand => 55,
            Self::ReadOCR => 58,
            Self::App(command) => command.index(),
        }
    }

    pub fn argument(self) -> u32 {
        match self {
            Self::GoIdleState
            | Self::SendOpCond
            | Self::SendCSD
            | Self::StopTransmission
            | Self::Erase
            | Self::AppCommand
            | Self::ReadOCR => 0,
            Self::SendIfCond(cond) => cond.into(),
            Self::SetBlockLen(length) => length,
            Self::ReadSingleBlock(address)
            | Self::WriteBlock(address)
            | Self::WriteMultipleBlock(address)
            | Self::EraseBlockStart(address)
            | Self::EraseBlockEnd(address) => address,
            Self::App(command) => command.argument(),
        }
    }

    pub fn is_app(self) -> bool {
        matches!(self, Self::App(_))
    }

    /// CRC checking is only active until the card leaves idle state, so
    /// only CMD0 and CMD8 carry a real checksum.
    pub fn trailer(self) -> u8 {
        match self {
            Self::GoIdleState => 0x95,
            Self::SendIfCond(_) => 0x87,
            _ => 0x01,
        }
    }
}

impl From<Command> for [u8; 6] {
    fn from(cmd: Command) -> [u8; 6] {
        let bytes = u32::to_be_bytes(cmd.argument());
        [0x40 | (cmd.index() & 0x3F), bytes[0], bytes[1], bytes[2], bytes[3], cmd.trailer()]
    }
}
