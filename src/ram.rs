use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::disk::{self, BlockDevice, DiskError, DiskResult, DriveStatus, Ioctl, SECTOR_SIZE};

/// Volatile block device backed by memory.
pub struct RamDisk {
    data: Mutex<Vec<u8>>,
    initialized: AtomicBool,
    write_protected: AtomicBool,
}

impl RamDisk {
    pub fn new(num_sectors: u32) -> Self {
        Self {
            data: Mutex::new(vec![0u8; num_sectors as usize * SECTOR_SIZE]),
            initialized: AtomicBool::new(false),
            write_protected: AtomicBool::new(false),
        }
    }

    pub fn set_write_protected(&self, protected: bool) {
        self.write_protected.store(protected, Ordering::Release);
    }

    fn num_sectors(&self) -> u32 {
        (self.data.lock().unwrap_or_else(PoisonError::into_inner).len() / SECTOR_SIZE) as u32
    }

    /// Byte range of `count` sectors from `sector`.
    fn range(&self, sector: u32, count: u32) -> Result<core::ops::Range<usize>, DiskError> {
        match sector.checked_add(count) {
            Some(end) if end <= self.num_sectors() => {
                Ok(sector as usize * SECTOR_SIZE..end as usize * SECTOR_SIZE)
            }
            _ => Err(DiskError::ParamError),
        }
    }
}

impl BlockDevice for RamDisk {
    fn initialize(&self) -> DriveStatus {
        self.initialized.store(true, Ordering::Release);
        self.status()
    }

    fn status(&self) -> DriveStatus {
        let mut status = DriveStatus::empty();
        status.set(DriveStatus::NOT_INITIALIZED, !self.initialized.load(Ordering::Acquire));
        status.set(DriveStatus::WRITE_PROTECTED, self.write_protected.load(Ordering::Acquire));
        status
    }

    fn read(&self, buffer: &mut [u8], sector: u32, count: u32) -> DiskResult {
        let len = disk::sectors_len(buffer.len(), sector, count)?;
        if self.status().contains(DriveStatus::NOT_INITIALIZED) {
            return Err(DiskError::NotReady);
        }
        let range = self.range(sector, count)?;
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        buffer[..len].copy_from_slice(&data[range]);
        Ok(())
    }

    fn write(&self, buffer: &[u8], sector: u32, count: u32) -> DiskResult {
        let len = disk::sectors_len(buffer.len(), sector, count)?;
        let status = self.status();
        if status.contains(DriveStatus::NOT_INITIALIZED) {
            return Err(DiskError::NotReady);
        }
        if status.contains(DriveStatus::WRITE_PROTECTED) {
            return Err(DiskError::WriteProtected);
        }
        let range = self.range(sector, count)?;
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data[range].copy_from_slice(&buffer[..len]);
        Ok(())
    }

    fn ioctl(&self, request: Ioctl<'_>) -> DiskResult {
        if self.status().contains(DriveStatus::NOT_INITIALIZED) {
            return Err(DiskError::NotReady);
        }
        match request {
            Ioctl::Sync => Ok(()),
            Ioctl::GetSectorCount(count) => {
                *count = self.num_sectors() as u64;
                Ok(())
            }
            Ioctl::GetBlockSize(size) => {
                *size = 1;
                Ok(())
            }
            Ioctl::EraseSector { start, end } if start <= end => {
                let range = self.range(start, end - start + 1)?;
                self.data.lock().unwrap_or_else(PoisonError::into_inner)[range].fill(0);
                Ok(())
            }
            _ => Err(DiskError::ParamError),
        }
    }
}
