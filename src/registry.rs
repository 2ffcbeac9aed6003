use std::sync::Arc;

use crate::disk::{BlockDevice, DiskError, DiskResult, DriveStatus, Ioctl};

pub type SharedDevice = Arc<dyn BlockDevice + Send + Sync>;

/// Physical drive table the filesystem layer dispatches through.
#[derive(Default)]
pub struct DriveRegistry {
    drives: Vec<Option<SharedDevice>>,
}

impl DriveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `ParamError` if `drive` is already taken.
    pub fn attach(&mut self, drive: u8, device: SharedDevice) -> DiskResult {
        let index = drive as usize;
        if self.drives.len() <= index {
            self.drives.resize(index + 1, None);
        }
        if self.drives[index].is_some() {
            warn!("Drive {} already attached", drive);
            return Err(DiskError::ParamError);
        }
        info!("Attaching drive {}", drive);
        self.drives[index] = Some(device);
        Ok(())
    }

    pub fn detach(&mut self, drive: u8) -> Option<SharedDevice> {
        self.drives.get_mut(drive as usize).and_then(Option::take)
    }

    pub fn get(&self, drive: u8) -> Option<&SharedDevice> {
        self.drives.get(drive as usize).and_then(Option::as_ref)
    }

    pub fn disk_initialize(&self, drive: u8) -> DriveStatus {
        trace!("Initialize drive {}", drive);
        self.get(drive).map(|d| d.initialize()).unwrap_or(DriveStatus::NOT_INITIALIZED)
    }

    pub fn disk_status(&self, drive: u8) -> DriveStatus {
        self.get(drive).map(|d| d.status()).unwrap_or(DriveStatus::NOT_INITIALIZED)
    }

    pub fn disk_read(&self, drive: u8, buffer: &mut [u8], sector: u32, count: u32) -> DiskResult {
        self.get(drive).ok_or(DiskError::ParamError)?.read(buffer, sector, count)
    }

    pub fn disk_write(&self, drive: u8, buffer: &[u8], sector: u32, count: u32) -> DiskResult {
        self.get(drive).ok_or(DiskError::ParamError)?.write(buffer, sector, count)
    }

    pub fn disk_ioctl(&self, drive: u8, request: Ioctl<'_>) -> DiskResult {
        self.get(drive).ok_or(DiskError::ParamError)?.ioctl(request)
    }
}
