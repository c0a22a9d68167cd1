use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::structs::BLOCK_SIZE;
use super::Ext2Error;

/// Whole disk image held in memory.
///
/// Every access is bounds-checked against the buffer; nothing is ever
/// reinterpreted in place as a typed structure. Changes stay in memory until
/// [`DiskImage::save`] writes the buffer back to the file it came from.
pub struct DiskImage {
    data: Vec<u8>,
    path: Option<PathBuf>,
}

impl DiskImage {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data, path: None }
    }

    pub fn open(path: &Path) -> Result<Self, Ext2Error> {
        let data = fs::read(path)?;
        if data.len() < 3 * BLOCK_SIZE || data.len() % BLOCK_SIZE != 0 {
            return Err(Ext2Error::Unsupported(
                "image size is not a whole number of 1 KiB blocks",
            ));
        }
        log::debug!("[image] loaded {} ({} bytes)", path.display(), data.len());
        Ok(Self {
            data,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn block_count(&self) -> u32 {
        (self.data.len() / BLOCK_SIZE) as u32
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn bytes(&self, offset: usize, len: usize) -> Result<&[u8], Ext2Error> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(Ext2Error::Corrupted("access past the end of the image"))?;
        Ok(&self.data[offset..end])
    }

    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8], Ext2Error> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(Ext2Error::Corrupted("access past the end of the image"))?;
        Ok(&mut self.data[offset..end])
    }

    pub fn save(&self) -> Result<(), Ext2Error> {
        match &self.path {
            Some(path) => self.save_as(path),
            None => Ok(()),
        }
    }

    pub fn save_as(&self, path: &Path) -> Result<(), Ext2Error> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&self.data)?;
        file.sync_all()?;
        log::debug!("[image] wrote {} bytes to {}", self.data.len(), path.display());
        Ok(())
    }
}
