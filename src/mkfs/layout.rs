use super::format::MkfsError;
use super::params::MkfsParams;
use crate::ext2::structs::{BLOCK_SIZE, EXT2_FIRST_INO_OLD, GROUP_DESC_BLOCK, INODE_SIZE};

pub const BLOCKS_PER_GROUP: u32 = 8192;
pub const MIN_BLOCKS: u32 = 64;
pub const MIN_INODES: u32 = 16;

/// Where everything goes in a one-group image with 1 KiB blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsLayout {
    pub first_data_block:   u32,
    pub gdt_block:          u32,
    pub block_bitmap:       u32,
    pub inode_bitmap:       u32,
    pub inode_table:        u32,
    pub inode_table_blocks: u32,
    pub data_start:         u32,
    pub root_block:         u32,
    pub lost_found_block:   u32,
    pub total_blocks:       u32,
    pub total_inodes:       u32,
    pub reserved_blocks:    u32,
    pub free_blocks:        u32,
    pub free_inodes:        u32,
}

impl FsLayout {
    pub fn compute(params: &MkfsParams) -> Result<Self, MkfsError> {
        let total_blocks = params.total_blocks;
        let total_inodes = params.inodes;
        let first_data_block = 1u32;

        if total_blocks < MIN_BLOCKS {
            return Err(MkfsError::DiskTooSmall);
        }
        if total_blocks - first_data_block > BLOCKS_PER_GROUP {
            return Err(MkfsError::TooManyGroups);
        }
        if total_inodes < MIN_INODES || total_inodes % 8 != 0 {
            return Err(MkfsError::InvalidParams(
                "inode count must be a multiple of 8 and at least 16",
            ));
        }
        if total_inodes > BLOCK_SIZE as u32 * 8 {
            return Err(MkfsError::InvalidParams("inode count does not fit one bitmap block"));
        }

        let gdt_block = GROUP_DESC_BLOCK;
        let block_bitmap = gdt_block + 1;
        let inode_bitmap = block_bitmap + 1;
        let inode_table = inode_bitmap + 1;
        let inode_table_blocks =
            (total_inodes * INODE_SIZE as u32 + BLOCK_SIZE as u32 - 1) / BLOCK_SIZE as u32;
        let data_start = inode_table + inode_table_blocks;
        let root_block = data_start;
        let lost_found_block = data_start + 1;

        if lost_found_block >= total_blocks {
            return Err(MkfsError::DiskTooSmall);
        }

        Ok(Self {
            first_data_block,
            gdt_block,
            block_bitmap,
            inode_bitmap,
            inode_table,
            inode_table_blocks,
            data_start,
            root_block,
            lost_found_block,
            total_blocks,
            total_inodes,
            reserved_blocks: total_blocks / 20,
            free_blocks: total_blocks - lost_found_block - 1,
            free_inodes: total_inodes - EXT2_FIRST_INO_OLD,
        })
    }

    /// Bit count of the block bitmap that maps real blocks.
    pub fn block_bits(&self) -> u32 {
        self.total_blocks - self.first_data_block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout() {
        let lay = FsLayout::compute(&MkfsParams::default()).unwrap();
        assert_eq!(lay.inode_table, 5);
        assert_eq!(lay.inode_table_blocks, 4);
        assert_eq!(lay.root_block, 9);
        assert_eq!(lay.lost_found_block, 10);
        assert_eq!(lay.free_blocks, 117);
        assert_eq!(lay.free_inodes, 21);
    }

    #[test]
    fn rejects_bad_sizes() {
        assert!(matches!(
            FsLayout::compute(&MkfsParams::new(63, 32)),
            Err(MkfsError::DiskTooSmall)
        ));
        assert!(matches!(
            FsLayout::compute(&MkfsParams::new(8194, 32)),
            Err(MkfsError::TooManyGroups)
        ));
        assert!(FsLayout::compute(&MkfsParams::new(8193, 32)).is_ok());
        assert!(matches!(
            FsLayout::compute(&MkfsParams::new(128, 20)),
            Err(MkfsError::InvalidParams(_))
        ));
        assert!(matches!(
            FsLayout::compute(&MkfsParams::new(128, 8)),
            Err(MkfsError::InvalidParams(_))
        ));
        // inode table alone would eat the disk
        assert!(matches!(
            FsLayout::compute(&MkfsParams::new(64, 512)),
            Err(MkfsError::DiskTooSmall)
        ));
    }
}
