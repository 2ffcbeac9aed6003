//! Block device contract consumed by a FatFs style filesystem layer.

use core::fmt;

use bitflags::bitflags;

use crate::bus;
use crate::sd::CardType;

pub use crate::sd::BLOCK_SIZE as SECTOR_SIZE;

bitflags! {
    /// Drive status bits, the empty set means ready.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct DriveStatus: u8 {
        const NOT_INITIALIZED = 0x01;
        const NO_DISK = 0x02;
        const WRITE_PROTECTED = 0x04;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DiskError {
    /// Hard error during the operation
    Error = 1,
    WriteProtected = 2,
    NotReady = 3,
    ParamError = 4,
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::Error => "disk I/O error",
            Self::WriteProtected => "disk is write protected",
            Self::NotReady => "disk not ready",
            Self::ParamError => "invalid parameter",
        };
        f.write_str(message)
    }
}

impl std::error::Error for DiskError {}

impl<E> From<bus::Error<E>> for DiskError {
    fn from(_: bus::Error<E>) -> Self {
        Self::Error
    }
}

pub type DiskResult = Result<(), DiskError>;

/// Control requests, output parameters are written in place.
#[derive(Debug)]
pub enum Ioctl<'a> {
    /// Flush pending writes, completes once the card is ready.
    Sync,
    GetSectorCount(&'a mut u64),
    /// Erase unit, in sectors.
    GetBlockSize(&'a mut u32),
    /// Inclusive sector range.
    EraseSector { start: u32, end: u32 },
    GetCardType(&'a mut CardType),
    GetCsd(&'a mut [u8; 16]),
    /// Any request code this driver doesn't know.
    Other(u8),
}

impl Ioctl<'_> {
    pub fn code(&self) -> u8 {
        match self {
            Self::Sync => 0,
            Self::GetSectorCount(_) => 1,
            Self::GetBlockSize(_) => 3,
            Self::EraseSector { .. } => 4,
            Self::GetCardType(_) => 10,
            Self::GetCsd(_) => 11,
            Self::Other(code) => *code,
        }
    }
}

pub trait BlockDevice {
    fn initialize(&self) -> DriveStatus;

    fn status(&self) -> DriveStatus;

    fn read(&self, buffer: &mut [u8], sector: u32, count: u32) -> DiskResult;

    fn write(&self, buffer: &[u8], sector: u32, count: u32) -> DiskResult;

    fn ioctl(&self, request: Ioctl<'_>) -> DiskResult;
}

/// Byte length of `count` sectors if `len` can hold them.
pub(crate) fn sectors_len(len: usize, sector: u32, count: u32) -> Result<usize, DiskError> {
    if count == 0 || sector.checked_add(count - 1).is_none() {
        return Err(DiskError::ParamError);
    }
    let size = (count as usize).checked_mul(SECTOR_SIZE).ok_or(DiskError::ParamError)?;
    match len >= size {
        true => Ok(size),
        false => Err(DiskError::ParamError),
    }
}
