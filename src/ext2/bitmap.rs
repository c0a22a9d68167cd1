use super::structs::*;
use super::{Ext2Error, Ext2Fs};

#[inline]
pub fn is_used(bitmap: &[u8], index: u32) -> bool {
    bitmap[(index / 8) as usize] & (1 << (index % 8)) != 0
}

#[inline]
pub fn set_used(bitmap: &mut [u8], index: u32, used: bool) {
    let byte = &mut bitmap[(index / 8) as usize];
    if used {
        *byte |= 1 << (index % 8);
    } else {
        *byte &= !(1 << (index % 8));
    }
}

/// Number of clear bits among the first `bits` entries.
pub fn count_free(bitmap: &[u8], bits: u32) -> u32 {
    (0..bits).filter(|&i| !is_used(bitmap, i)).count() as u32
}

impl Ext2Fs {
    #[inline]
    fn block_bit(&self, block_num: u32) -> u32 {
        block_num - self.superblock.first_data_block()
    }

    pub fn is_block_used(&self, block_num: u32) -> Result<bool, Ext2Error> {
        if block_num < self.superblock.first_data_block() || block_num >= self.blocks_count() {
            return Err(Ext2Error::InvalidBlock(block_num));
        }
        let bit = self.block_bit(block_num);
        Ok(is_used(self.block_bitmap()?, bit))
    }

    pub fn is_inode_used(&self, inode_num: u32) -> Result<bool, Ext2Error> {
        if inode_num == 0 || inode_num > self.inodes_count() {
            return Err(Ext2Error::InvalidInode(inode_num));
        }
        Ok(is_used(self.inode_bitmap()?, inode_num - 1))
    }

    /// Reserves `count` data blocks in one go.
    ///
    /// The free counters are consulted before the bitmap is touched, so a
    /// request that cannot be met leaves the image as it was. Every returned
    /// block is zero-filled.
    pub fn allocate_blocks(&mut self, count: u32) -> Result<Vec<u32>, Ext2Error> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if count > self.superblock.free_blocks_count() || count > self.group.free_blocks() as u32 {
            return Err(Ext2Error::NoSpace);
        }

        let start = self.first_data_zone();
        let end = self.blocks_count();
        let first = self.superblock.first_data_block();
        let bitmap_block = self.group.block_bitmap();

        let mut found = Vec::with_capacity(count as usize);
        {
            let bitmap = self.block_mut(bitmap_block)?;
            for block_num in start..end {
                if found.len() == count as usize {
                    break;
                }
                let bit = block_num - first;
                if is_used(bitmap, bit) {
                    continue;
                }
                set_used(bitmap, bit, true);
                found.push(block_num);
            }

            if found.len() < count as usize {
                for &block_num in &found {
                    set_used(bitmap, block_num - first, false);
                }
                log::warn!(
                    "[bitmap] wanted {} blocks, bitmap only had {}; rolled back",
                    count,
                    found.len()
                );
                return Err(Ext2Error::Corrupted("block bitmap disagrees with free count"));
            }
        }

        for &block_num in &found {
            self.zero_block(block_num)?;
        }
        self.update_group_free_blocks(-(count as i32))?;
        self.update_superblock_free_blocks(-(count as i32))?;

        log::debug!("[bitmap] allocated blocks {:?}", found);
        Ok(found)
    }

    pub fn allocate_block(&mut self) -> Result<u32, Ext2Error> {
        self.allocate_blocks(1)?
            .into_iter()
            .next()
            .ok_or(Ext2Error::NoSpace)
    }

    pub fn free_block(&mut self, block_num: u32) -> Result<(), Ext2Error> {
        if block_num < self.first_data_zone() || !self.is_block_used(block_num)? {
            return Err(Ext2Error::InvalidBlock(block_num));
        }

        let bit = self.block_bit(block_num);
        let bitmap_block = self.group.block_bitmap();
        set_used(self.block_mut(bitmap_block)?, bit, false);

        self.update_group_free_blocks(1)?;
        self.update_superblock_free_blocks(1)?;
        log::debug!("[bitmap] freed block {}", block_num);
        Ok(())
    }

    /// Takes the lowest free inode at or above the first non-reserved one
    /// and writes it back zeroed.
    pub fn allocate_inode(&mut self) -> Result<u32, Ext2Error> {
        if self.superblock.free_inodes_count() == 0 || self.group.free_inodes() == 0 {
            return Err(Ext2Error::NoSpace);
        }

        let first = self.superblock.first_ino().max(EXT2_ROOT_INO + 1);
        let total = self.inodes_count();
        let bitmap_block = self.group.inode_bitmap();

        let mut chosen = None;
        {
            let bitmap = self.block_mut(bitmap_block)?;
            for inode_num in first..=total {
                if !is_used(bitmap, inode_num - 1) {
                    set_used(bitmap, inode_num - 1, true);
                    chosen = Some(inode_num);
                    break;
                }
            }
        }
        let inode_num =
            chosen.ok_or(Ext2Error::Corrupted("inode bitmap disagrees with free count"))?;

        self.write_inode(inode_num, &Inode::zeroed())?;
        self.update_group_free_inodes(-1)?;
        self.update_superblock_free_inodes(-1)?;

        log::debug!("[bitmap] allocated inode {}", inode_num);
        Ok(inode_num)
    }

    /// Releases an inode together with every block it owns.
    pub fn free_inode(&mut self, inode_num: u32) -> Result<(), Ext2Error> {
        if inode_num < self.superblock.first_ino() || !self.is_inode_used(inode_num)? {
            return Err(Ext2Error::InvalidInode(inode_num));
        }

        let mut inode = self.read_inode(inode_num)?;
        let was_dir = inode.is_directory();

        self.free_all_blocks(&mut inode)?;
        inode.set_links_count(0);
        inode.set_dtime(self.get_timestamp());
        self.write_inode(inode_num, &inode)?;

        if was_dir {
            self.group.dec_used_dirs();
            self.flush_group_desc()?;
        }

        let bitmap_block = self.group.inode_bitmap();
        set_used(self.block_mut(bitmap_block)?, inode_num - 1, false);
        self.update_group_free_inodes(1)?;
        self.update_superblock_free_inodes(1)?;

        log::debug!("[bitmap] freed inode {}", inode_num);
        Ok(())
    }

    pub fn update_group_free_blocks(&mut self, delta: i32) -> Result<(), Ext2Error> {
        let current = self.group.free_blocks();
        let new_val = (current as i32 + delta).clamp(0, u16::MAX as i32) as u16;
        self.group.set_free_blocks(new_val);
        self.flush_group_desc()
    }

    pub fn update_group_free_inodes(&mut self, delta: i32) -> Result<(), Ext2Error> {
        let current = self.group.free_inodes();
        let new_val = (current as i32 + delta).clamp(0, u16::MAX as i32) as u16;
        self.group.set_free_inodes(new_val);
        self.flush_group_desc()
    }

    pub fn update_superblock_free_blocks(&mut self, delta: i32) -> Result<(), Ext2Error> {
        let current = self.superblock.free_blocks_count();
        let new_val = (current as i64 + delta as i64).max(0) as u32;
        self.superblock.set_free_blocks_count(new_val);
        self.flush_superblock()
    }

    pub fn update_superblock_free_inodes(&mut self, delta: i32) -> Result<(), Ext2Error> {
        let current = self.superblock.free_inodes_count();
        let new_val = (current as i64 + delta as i64).max(0) as u32;
        self.superblock.set_free_inodes_count(new_val);
        self.flush_superblock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext2::testutil::fresh_fs;

    #[test]
    fn bit_helpers() {
        let mut map = [0u8; 4];
        set_used(&mut map, 9, true);
        assert_eq!(map[1], 0b10);
        assert!(is_used(&map, 9));
        assert_eq!(count_free(&map, 32), 31);
        set_used(&mut map, 9, false);
        assert_eq!(count_free(&map, 32), 32);
    }

    #[test]
    fn allocates_past_inode_table() {
        let mut fs = fresh_fs();
        let free_before = fs.superblock.free_blocks_count();
        let blk = fs.allocate_block().unwrap();

        assert!(blk >= fs.first_data_zone());
        assert!(fs.is_block_used(blk).unwrap());
        assert_eq!(fs.superblock.free_blocks_count(), free_before - 1);
        assert_eq!(fs.group.free_blocks() as u32, free_before - 1);
    }

    #[test]
    fn allocated_block_is_zeroed() {
        let mut fs = fresh_fs();
        let blk = fs.allocate_block().unwrap();
        fs.block_mut(blk).unwrap().fill(0xAA);
        fs.free_block(blk).unwrap();

        let again = fs.allocate_block().unwrap();
        assert_eq!(again, blk);
        assert!(fs.block(again).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn oversized_request_touches_nothing() {
        let mut fs = fresh_fs();
        let free = fs.superblock.free_blocks_count();
        let bitmap_before = fs.block_bitmap().unwrap().to_vec();

        assert!(matches!(fs.allocate_blocks(free + 1), Err(Ext2Error::NoSpace)));
        assert_eq!(fs.superblock.free_blocks_count(), free);
        assert_eq!(fs.block_bitmap().unwrap(), &bitmap_before[..]);
    }

    #[test]
    fn lying_free_count_is_rolled_back() {
        let mut fs = fresh_fs();
        let free = fs.superblock.free_blocks_count();
        fs.superblock.set_free_blocks_count(free + 5);
        fs.group.set_free_blocks(free as u16 + 5);
        let bitmap_before = fs.block_bitmap().unwrap().to_vec();

        assert!(matches!(
            fs.allocate_blocks(free + 3),
            Err(Ext2Error::Corrupted(_))
        ));
        assert_eq!(fs.block_bitmap().unwrap(), &bitmap_before[..]);
    }

    #[test]
    fn double_free_is_rejected() {
        let mut fs = fresh_fs();
        let blk = fs.allocate_block().unwrap();
        fs.free_block(blk).unwrap();
        assert!(matches!(fs.free_block(blk), Err(Ext2Error::InvalidBlock(_))));
        assert!(matches!(fs.free_block(3), Err(Ext2Error::InvalidBlock(3))));
    }

    #[test]
    fn inode_allocation_skips_reserved() {
        let mut fs = fresh_fs();
        let free = fs.superblock.free_inodes_count();
        let ino = fs.allocate_inode().unwrap();

        assert!(ino > fs.superblock.first_ino());
        assert!(fs.is_inode_used(ino).unwrap());
        assert_eq!(fs.superblock.free_inodes_count(), free - 1);

        fs.free_inode(ino).unwrap();
        assert!(!fs.is_inode_used(ino).unwrap());
        assert_eq!(fs.superblock.free_inodes_count(), free);
        assert_ne!(fs.read_inode(ino).unwrap().dtime(), 0);
    }

    #[test]
    fn freeing_directory_inode_drops_used_dirs() {
        let mut fs = fresh_fs();
        let ino = fs.allocate_inode().unwrap();
        let mut inode = Inode::zeroed();
        inode.init_dir(0o755, 1);
        fs.write_inode(ino, &inode).unwrap();
        fs.group.inc_used_dirs();

        let dirs = fs.group.used_dirs();
        fs.free_inode(ino).unwrap();
        assert_eq!(fs.group.used_dirs(), dirs - 1);
    }

    #[test]
    fn inode_exhaustion() {
        let mut fs = fresh_fs();
        let free = fs.superblock.free_inodes_count();
        for _ in 0..free {
            fs.allocate_inode().unwrap();
        }
        assert!(matches!(fs.allocate_inode(), Err(Ext2Error::NoSpace)));
    }
}
