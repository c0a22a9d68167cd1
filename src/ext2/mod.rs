pub mod bitmap;
pub mod dir;
pub mod fsck;
pub mod hardlink;
pub mod image;
pub mod inode_ops;
pub mod path;
pub mod structs;
pub mod write;

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use image::DiskImage;
use structs::*;

pub const ENOENT: i32 = 2;
pub const EIO: i32 = 5;
pub const EEXIST: i32 = 17;
pub const ENOTDIR: i32 = 20;
pub const EISDIR: i32 = 21;
pub const EINVAL: i32 = 22;
pub const EFBIG: i32 = 27;
pub const ENOSPC: i32 = 28;
pub const ENAMETOOLONG: i32 = 36;

#[derive(Debug, Error)]
pub enum Ext2Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad superblock magic 0x{0:04X}")]
    BadMagic(u16),
    #[error("unsupported image: {0}")]
    Unsupported(&'static str),
    #[error("invalid block number {0}")]
    InvalidBlock(u32),
    #[error("invalid inode number {0}")]
    InvalidInode(u32),
    #[error("corrupted filesystem: {0}")]
    Corrupted(&'static str),
    #[error("No such file or directory")]
    NotFound,
    #[error("Not a directory")]
    NotDirectory,
    #[error("Is a directory")]
    IsDirectory,
    #[error("File exists")]
    AlreadyExists,
    #[error("File name too long")]
    NameTooLong,
    #[error("No space left on device")]
    NoSpace,
    #[error("File too large")]
    FileTooLarge,
    #[error("directory cannot hold another entry")]
    DirectoryFull,
    #[error("Invalid path")]
    InvalidPath,
}

impl Ext2Error {
    /// POSIX errno reported as the process exit status.
    pub fn errno(&self) -> i32 {
        match self {
            Ext2Error::Io(_) => EIO,
            Ext2Error::BadMagic(_) => EINVAL,
            Ext2Error::Unsupported(_) => EINVAL,
            Ext2Error::InvalidBlock(_) => EIO,
            Ext2Error::InvalidInode(_) => EIO,
            Ext2Error::Corrupted(_) => EIO,
            Ext2Error::NotFound => ENOENT,
            Ext2Error::NotDirectory => ENOTDIR,
            Ext2Error::IsDirectory => EISDIR,
            Ext2Error::AlreadyExists => EEXIST,
            Ext2Error::NameTooLong => ENAMETOOLONG,
            Ext2Error::NoSpace => ENOSPC,
            Ext2Error::FileTooLarge => EFBIG,
            Ext2Error::DirectoryFull => ENOSPC,
            Ext2Error::InvalidPath => EINVAL,
        }
    }
}

/// One open single-group ext2 image.
///
/// `superblock` and `group` are decoded copies of the on-disk records. Every
/// change to them goes through [`Ext2Fs::flush_superblock`] or
/// [`Ext2Fs::flush_group_desc`] right away, so the image stays the only
/// source of truth.
pub struct Ext2Fs {
    pub image: DiskImage,
    pub superblock: Superblock,
    pub group: GroupDesc,
    pub block_size: u32,
    pub inodes_per_group: u32,
    pub inode_size: u32,
}

impl Ext2Fs {
    pub fn open(path: &Path) -> Result<Self, Ext2Error> {
        Self::from_image(DiskImage::open(path)?)
    }

    pub fn from_image(image: DiskImage) -> Result<Self, Ext2Error> {
        let superblock =
            Superblock::from_bytes(image.bytes(SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE)?);

        if superblock.magic() != EXT2_MAGIC {
            return Err(Ext2Error::BadMagic(superblock.magic()));
        }
        if superblock.block_size() as usize != BLOCK_SIZE {
            return Err(Ext2Error::Unsupported("only 1 KiB blocks are supported"));
        }

        let blocks_count = superblock.blocks_count();
        if blocks_count > image.block_count() {
            return Err(Ext2Error::Corrupted("image is shorter than its block count"));
        }

        let blocks_per_group = superblock.blocks_per_group();
        if blocks_per_group == 0
            || blocks_count.saturating_sub(superblock.first_data_block()) > blocks_per_group
        {
            return Err(Ext2Error::Unsupported("more than one block group"));
        }
        if superblock.inodes_count() > superblock.inodes_per_group() {
            return Err(Ext2Error::Unsupported("more than one block group"));
        }
        let bitmap_bits = (BLOCK_SIZE * 8) as u32;
        if blocks_count.saturating_sub(superblock.first_data_block()) > bitmap_bits
            || superblock.inodes_count() > bitmap_bits
        {
            return Err(Ext2Error::Unsupported("group does not fit one bitmap block"));
        }

        let inode_size = superblock.inode_size_val();
        if (inode_size as usize) < INODE_SIZE
            || !inode_size.is_power_of_two()
            || inode_size as usize > BLOCK_SIZE
        {
            return Err(Ext2Error::Unsupported("inode size"));
        }

        let gd_offset = GROUP_DESC_BLOCK as usize * BLOCK_SIZE;
        let group = GroupDesc::from_bytes(image.bytes(gd_offset, GROUP_DESC_SIZE)?);

        let fs = Self {
            image,
            superblock,
            group,
            block_size: BLOCK_SIZE as u32,
            inodes_per_group: superblock.inodes_per_group(),
            inode_size,
        };

        for blk in [fs.group.block_bitmap(), fs.group.inode_bitmap(), fs.group.inode_table()] {
            if blk <= GROUP_DESC_BLOCK || blk >= blocks_count {
                return Err(Ext2Error::Corrupted("group descriptor points outside the image"));
            }
        }
        if fs.first_data_zone() > blocks_count {
            return Err(Ext2Error::Corrupted("inode table runs past the last block"));
        }

        log::debug!(
            "[ext2] opened: {} blocks ({} free), {} inodes ({} free)",
            blocks_count,
            fs.superblock.free_blocks_count(),
            fs.superblock.inodes_count(),
            fs.superblock.free_inodes_count()
        );

        Ok(fs)
    }

    pub fn save(&mut self) -> Result<(), Ext2Error> {
        let now = self.get_timestamp();
        self.superblock.set_wtime(now);
        self.flush_superblock()?;
        self.image.save()
    }

    pub fn into_image(self) -> DiskImage {
        self.image
    }

    pub fn get_timestamp(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    }

    #[inline]
    pub fn blocks_count(&self) -> u32 {
        self.superblock.blocks_count()
    }

    #[inline]
    pub fn inodes_count(&self) -> u32 {
        self.superblock.inodes_count()
    }

    #[inline]
    pub fn ptrs_per_block(&self) -> u32 {
        self.block_size / 4
    }

    pub fn inode_table_blocks(&self) -> u32 {
        let bytes = self.inodes_count() * self.inode_size;
        (bytes + self.block_size - 1) / self.block_size
    }

    /// First block after the group metadata; the allocator never hands out
    /// anything below it.
    pub fn first_data_zone(&self) -> u32 {
        self.group.inode_table() + self.inode_table_blocks()
    }

    fn check_block(&self, block_num: u32) -> Result<usize, Ext2Error> {
        if block_num == 0 || block_num >= self.blocks_count() {
            return Err(Ext2Error::InvalidBlock(block_num));
        }
        Ok(block_num as usize * BLOCK_SIZE)
    }

    pub fn block(&self, block_num: u32) -> Result<&[u8], Ext2Error> {
        let offset = self.check_block(block_num)?;
        self.image.bytes(offset, BLOCK_SIZE)
    }

    pub fn block_mut(&mut self, block_num: u32) -> Result<&mut [u8], Ext2Error> {
        let offset = self.check_block(block_num)?;
        self.image.bytes_mut(offset, BLOCK_SIZE)
    }

    pub fn zero_block(&mut self, block_num: u32) -> Result<(), Ext2Error> {
        self.block_mut(block_num)?.fill(0);
        Ok(())
    }

    pub fn write_block_data(&mut self, block_num: u32, data: &[u8]) -> Result<(), Ext2Error> {
        let block = self.block_mut(block_num)?;
        let len = data.len().min(BLOCK_SIZE);
        block[..len].copy_from_slice(&data[..len]);
        block[len..].fill(0);
        Ok(())
    }

    pub fn block_bitmap(&self) -> Result<&[u8], Ext2Error> {
        self.block(self.group.block_bitmap())
    }

    pub fn inode_bitmap(&self) -> Result<&[u8], Ext2Error> {
        self.block(self.group.inode_bitmap())
    }

    pub fn flush_superblock(&mut self) -> Result<(), Ext2Error> {
        let data = self.superblock.data;
        self.image
            .bytes_mut(SUPERBLOCK_OFFSET, SUPERBLOCK_SIZE)?
            .copy_from_slice(&data);
        Ok(())
    }

    pub fn flush_group_desc(&mut self) -> Result<(), Ext2Error> {
        let data = self.group.data;
        let offset = GROUP_DESC_BLOCK as usize * BLOCK_SIZE;
        self.image
            .bytes_mut(offset, GROUP_DESC_SIZE)?
            .copy_from_slice(&data);
        Ok(())
    }

    pub fn fs_info(&self) -> Ext2Info {
        Ext2Info {
            block_size: self.block_size,
            total_blocks: self.superblock.blocks_count(),
            free_blocks: self.superblock.free_blocks_count(),
            total_inodes: self.superblock.inodes_count(),
            free_inodes: self.superblock.free_inodes_count(),
            used_dirs: self.group.used_dirs(),
            inode_size: self.inode_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ext2Info {
    pub block_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub total_inodes: u32,
    pub free_inodes: u32,
    pub used_dirs: u16,
    pub inode_size: u32,
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::mkfs::{mkfs, MkfsParams};

    pub fn fresh_fs() -> Ext2Fs {
        fs_with(MkfsParams::default())
    }

    pub fn fs_with(params: MkfsParams) -> Ext2Fs {
        let (image, _) = mkfs(&params).unwrap();
        Ext2Fs::from_image(image).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::fresh_fs;
    use super::*;
    use crate::mkfs::{mkfs, MkfsParams};

    #[test]
    fn opens_fresh_image() {
        let fs = fresh_fs();
        let info = fs.fs_info();
        assert_eq!(info.block_size, 1024);
        assert_eq!(info.total_blocks, 128);
        assert_eq!(info.total_inodes, 32);
        assert_eq!(info.used_dirs, 2);
    }

    #[test]
    fn block_zero_and_past_end_are_rejected() {
        let fs = fresh_fs();
        assert!(matches!(fs.block(0), Err(Ext2Error::InvalidBlock(0))));
        assert!(matches!(fs.block(128), Err(Ext2Error::InvalidBlock(128))));
        assert!(fs.block(127).is_ok());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = fresh_fs().into_image().into_bytes();
        bytes[SUPERBLOCK_OFFSET + 56] = 0;
        let err = Ext2Fs::from_image(DiskImage::from_bytes(bytes)).err().unwrap();
        assert!(matches!(err, Ext2Error::BadMagic(_)));
    }

    #[test]
    fn rejects_group_wider_than_its_bitmap() {
        let (image, _) = mkfs(&MkfsParams::new(8193, 256)).unwrap();
        let mut bytes = image.into_bytes();
        bytes.resize(10_000 * BLOCK_SIZE, 0);
        let sb = SUPERBLOCK_OFFSET;
        wr_u32(&mut bytes, sb + sb_off::BLOCKS_COUNT, 10_000);
        wr_u32(&mut bytes, sb + sb_off::BLOCKS_PER_GROUP, 10_000);

        let err = Ext2Fs::from_image(DiskImage::from_bytes(bytes)).err().unwrap();
        assert!(matches!(err, Ext2Error::Unsupported(_)));
    }

    #[test]
    fn rejects_inode_count_wider_than_its_bitmap() {
        let mut bytes = fresh_fs().into_image().into_bytes();
        let sb = SUPERBLOCK_OFFSET;
        wr_u32(&mut bytes, sb + sb_off::INODES_COUNT, 8200);
        wr_u32(&mut bytes, sb + sb_off::INODES_PER_GROUP, 8200);

        let err = Ext2Fs::from_image(DiskImage::from_bytes(bytes)).err().unwrap();
        assert!(matches!(err, Ext2Error::Unsupported(_)));
    }

    #[test]
    fn errno_mapping() {
        assert_eq!(Ext2Error::NotFound.errno(), ENOENT);
        assert_eq!(Ext2Error::IsDirectory.errno(), EISDIR);
        assert_eq!(Ext2Error::AlreadyExists.errno(), EEXIST);
        assert_eq!(Ext2Error::NameTooLong.errno(), ENAMETOOLONG);
        assert_eq!(Ext2Error::NoSpace.errno(), ENOSPC);
        assert_eq!(Ext2Error::FileTooLarge.errno(), EFBIG);
    }
}
