pub mod command;
pub mod registers;
pub mod response;
pub mod transfer;

pub const BLOCK_SIZE: usize = 512;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CardType {
    #[default]
    Unknown,
    MMC,
    SD1,
    SD2,
}

impl CardType {
    pub fn is_sd(self) -> bool {
        matches!(self, Self::SD1 | Self::SD2)
    }
}

/// Card probed by the last `initialize()`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Card {
    pub kind: CardType,
    pub block_addressed: bool,
}

impl Card {
    pub const UNKNOWN: Self = Self { kind: CardType::Unknown, block_addressed: false };

    pub fn new(kind: CardType, block_addressed: bool) -> Self {
        Self { kind, block_addressed }
    }

    pub fn known(self) -> bool {
        self.kind != CardType::Unknown
    }

    /// Command argument for `sector`, `None` if it doesn't fit a byte address.
    pub fn address(self, sector: u32) -> Option<u32> {
        match self.block_addressed {
            true => Some(sector),
            false => sector.checked_mul(BLOCK_SIZE as u32),
        }
    }

    /// Address increment between consecutive sectors.
    pub fn address_step(self) -> u32 {
        match self.block_addressed {
            true => 1,
            false => BLOCK_SIZE as u32,
        }
    }
}
