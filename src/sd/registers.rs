use bitfield::bitfield;

use super::BLOCK_SIZE;

const BLOCK_SIZE_SHIFT: u32 = BLOCK_SIZE.trailing_zeros();

bitfield! {
    /// CSD structure 1.0, also the layout of every MMC CSD.
    #[derive(Copy, Clone)]
    pub struct CSDv1(u128);
    pub version, _: 127, 126;
    pub max_read_data_block_length, _: 83, 80;
    pub device_size, _: 73, 62;
    pub device_size_multiplier, _: 49, 47;
    pub erase_single_block_enabled, _: 46;
    pub erase_sector_size, _: 45, 39;
    pub mmc_erase_group_size, _: 46, 42;
    pub mmc_erase_group_multiplier, _: 41, 37;
    pub max_write_data_block_length, _: 25, 22;
}

impl CSDv1 {
    pub fn num_blocks(&self) -> u64 {
        let shift = (self.device_size_multiplier() + 2 + self.max_read_data_block_length()) as u32;
        let device_size = self.device_size() as u64 + 1;
        match shift.checked_sub(BLOCK_SIZE_SHIFT) {
            Some(shift) => device_size << shift,
            None => device_size >> (BLOCK_SIZE_SHIFT - shift),
        }
    }

    /// Erase unit of SD 1.x cards, in sectors.
    pub fn sd_erase_block_size(&self) -> u32 {
        let sectors = self.erase_sector_size() as u32 + 1;
        let write_block_shift = self.max_write_data_block_length() as u32;
        sectors << write_block_shift.saturating_sub(BLOCK_SIZE_SHIFT)
    }

    /// Erase group of MMC cards, in sectors.
    pub fn mmc_erase_block_size(&self) -> u32 {
        (self.mmc_erase_group_size() as u32 + 1) * (self.mmc_erase_group_multiplier() as u32 + 1)
    }
}

bitfield! {
    /// CSD structure 2.0, SDHC and SDXC.
    #[derive(Copy, Clone)]
    pub struct CSDv2(u128);
    pub device_size, _: 69, 48;
}

impl CSDv2 {
    pub fn num_blocks(&self) -> u64 {
        (self.device_size() as u64 + 1) * 1024
    }
}

#[derive(Copy, Clone)]
pub enum CSD {
    V1(CSDv1),
    V2(CSDv2),
}

impl CSD {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let value = u128::from_be_bytes(bytes);
        match CSDv1(value).version() {
            1 => Self::V2(CSDv2(value)),
            _ => Self::V1(CSDv1(value)),
        }
    }

    /// Capacity in 512-byte sectors.
    pub fn num_blocks(&self) -> u64 {
        match self {
            Self::V1(csd) => csd.num_blocks(),
            Self::V2(csd) => csd.num_blocks(),
        }
    }

    /// Whether CMD32/CMD33/CMD38 may address single sectors.
    pub fn sector_erase_supported(&self) -> bool {
        match self {
            Self::V1(csd) => csd.erase_single_block_enabled(),
            Self::V2(_) => true,
        }
    }
}

bitfield! {
    /// First 16 of the 64 bytes returned by ACMD13.
    #[derive(Copy, Clone)]
    pub struct SDStatus(u128);
    pub allocation_unit_size, _: 47, 44;
}

impl SDStatus {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }

    /// Allocation unit, in sectors.
    pub fn erase_block_size(&self) -> u32 {
        16u32 << self.allocation_unit_size() as u32
    }
}

#[cfg(test)]
mod test {
    use super::{SDStatus, CSD};
    use hex_literal::hex;

    #[test]
    fn test_csd_v2() {
        let mut bytes = [0u8; 16];
        bytes[0] = 0x40;
        bytes[8] = 0x0F;
        bytes[9] = 0xFF;
        assert_eq!(CSD::from_bytes(bytes).num_blocks(), 4_194_304);

        let csd = CSD::from_bytes(hex!("40 0E 00 32 5B 59 00 00 3A 91 7F 80 0A 40 00 05"));
        assert_eq!(csd.num_blocks(), 15_353_856);
        assert!(csd.sector_erase_supported());
    }

    #[test]
    fn test_csd_v1() {
        let csd = CSD::from_bytes(hex!("00 26 00 32 5F 59 83 C8 AD DB CF FF D2 40 40 A5"));
        assert_eq!(csd.num_blocks(), 1_984_000);
        assert!(csd.sector_erase_supported());
        match csd {
            CSD::V1(v1) => assert_eq!(v1.sd_erase_block_size(), 32),
            CSD::V2(_) => panic!("expect CSD 1.0"),
        }

        let csd = CSD::from_bytes(hex!("00 7F 00 32 5B 5A 83 AF 7F FF CF 80 16 80 00 6F"));
        assert_eq!(csd.num_blocks(), 3_864_576);
    }

    #[test]
    fn test_mmc_erase_group() {
        // ERASE_GRP_SIZE = 31, ERASE_GRP_MULT = 31
        let mut bytes = [0u8; 16];
        bytes[10] = 0x7F;
        bytes[11] = 0xE0;
        match CSD::from_bytes(bytes) {
            CSD::V1(v1) => assert_eq!(v1.mmc_erase_block_size(), 1024),
            CSD::V2(_) => panic!("expect CSD 1.0"),
        }
    }

    #[test]
    fn test_sd_status_allocation_unit() {
        let mut bytes = [0u8; 16];
        bytes[10] = 0x90; // AU_SIZE = 9, 4 MiB
        assert_eq!(SDStatus::from_bytes(bytes).erase_block_size(), 8192);
    }
}
