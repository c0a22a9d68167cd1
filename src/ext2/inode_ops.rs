use super::structs::*;
use super::{Ext2Error, Ext2Fs};

impl Ext2Fs {
    fn inode_offset(&self, inode_num: u32) -> Result<usize, Ext2Error> {
        if inode_num == 0 || inode_num > self.inodes_count() {
            return Err(Ext2Error::InvalidInode(inode_num));
        }
        let table = self.group.inode_table() as usize * BLOCK_SIZE;
        Ok(table + (inode_num - 1) as usize * self.inode_size as usize)
    }

    pub fn read_inode(&self, inode_num: u32) -> Result<Inode, Ext2Error> {
        let offset = self.inode_offset(inode_num)?;
        Ok(Inode::from_bytes(self.image.bytes(offset, INODE_SIZE)?))
    }

    pub fn write_inode(&mut self, inode_num: u32, inode: &Inode) -> Result<(), Ext2Error> {
        let offset = self.inode_offset(inode_num)?;
        self.image
            .bytes_mut(offset, INODE_SIZE)?
            .copy_from_slice(&inode.data);
        Ok(())
    }

    /// Direct slots plus one indirect block of pointers.
    pub fn max_logical_blocks(&self) -> u32 {
        EXT2_NDIR_BLOCKS as u32 + self.ptrs_per_block()
    }

    #[inline]
    fn sectors_per_block(&self) -> u32 {
        self.block_size / 512
    }

    pub fn read_indirect_entry(&self, block_num: u32, index: u32) -> Result<u32, Ext2Error> {
        if index >= self.ptrs_per_block() {
            return Err(Ext2Error::InvalidBlock(block_num));
        }
        Ok(rd_u32(self.block(block_num)?, index as usize * 4))
    }

    pub fn write_indirect_entry(
        &mut self,
        block_num: u32,
        index: u32,
        value: u32,
    ) -> Result<(), Ext2Error> {
        if index >= self.ptrs_per_block() {
            return Err(Ext2Error::InvalidBlock(block_num));
        }
        wr_u32(self.block_mut(block_num)?, index as usize * 4, value);
        Ok(())
    }

    pub fn get_block_number(&self, inode: &Inode, idx: u32) -> Result<u32, Ext2Error> {
        if idx >= self.max_logical_blocks() {
            return Err(Ext2Error::FileTooLarge);
        }
        if (idx as usize) < EXT2_NDIR_BLOCKS {
            return Ok(inode.block(idx as usize));
        }
        let indirect = inode.block(EXT2_IND_BLOCK);
        if indirect == 0 {
            return Ok(0);
        }
        self.read_indirect_entry(indirect, idx - EXT2_NDIR_BLOCKS as u32)
    }

    pub fn set_block_number(
        &mut self,
        inode: &mut Inode,
        idx: u32,
        value: u32,
    ) -> Result<(), Ext2Error> {
        if idx >= self.max_logical_blocks() {
            return Err(Ext2Error::FileTooLarge);
        }
        if (idx as usize) < EXT2_NDIR_BLOCKS {
            inode.set_block(idx as usize, value);
            return Ok(());
        }
        let indirect = inode.block(EXT2_IND_BLOCK);
        if indirect == 0 {
            return Err(Ext2Error::Corrupted("indirect slot used without an indirect block"));
        }
        self.write_indirect_entry(indirect, idx - EXT2_NDIR_BLOCKS as u32, value)
    }

    fn add_sectors(&self, inode: &mut Inode) {
        inode.set_blocks(inode.blocks() + self.sectors_per_block());
    }

    fn sub_sectors(&self, inode: &mut Inode) {
        inode.set_blocks(inode.blocks().saturating_sub(self.sectors_per_block()));
    }

    /// Backs logical block `idx` with a fresh zeroed block.
    ///
    /// Returns `None` when the slot is already occupied. A missing indirect
    /// block is reserved in the same allocation as the data block.
    pub fn allocate_block_on_inode(
        &mut self,
        inode: &mut Inode,
        idx: u32,
    ) -> Result<Option<u32>, Ext2Error> {
        if self.get_block_number(inode, idx)? != 0 {
            return Ok(None);
        }

        let need_indirect =
            idx as usize >= EXT2_NDIR_BLOCKS && inode.block(EXT2_IND_BLOCK) == 0;
        let fresh = self.allocate_blocks(1 + need_indirect as u32)?;

        let data = match *fresh.as_slice() {
            [indirect, data] => {
                inode.set_block(EXT2_IND_BLOCK, indirect);
                self.add_sectors(inode);
                data
            }
            [data] => data,
            _ => return Err(Ext2Error::Corrupted("allocator returned the wrong block count")),
        };

        self.set_block_number(inode, idx, data)?;
        self.add_sectors(inode);
        Ok(Some(data))
    }

    /// Frees the block behind `idx` and the indirect block once it holds no
    /// more pointers.
    pub fn clear_block_number(&mut self, inode: &mut Inode, idx: u32) -> Result<(), Ext2Error> {
        let phys = self.get_block_number(inode, idx)?;
        if phys == 0 {
            return Ok(());
        }

        self.free_block(phys)?;
        self.set_block_number(inode, idx, 0)?;
        self.sub_sectors(inode);

        if idx as usize >= EXT2_NDIR_BLOCKS {
            let indirect = inode.block(EXT2_IND_BLOCK);
            if self.block(indirect)?.iter().all(|&b| b == 0) {
                self.free_block(indirect)?;
                inode.set_block(EXT2_IND_BLOCK, 0);
                self.sub_sectors(inode);
                log::debug!("[inode] released empty indirect block {}", indirect);
            }
        }
        Ok(())
    }

    /// `(logical, physical)` pairs for every backed slot, in logical order.
    pub fn occupied_blocks(&self, inode: &Inode) -> Result<Vec<(u32, u32)>, Ext2Error> {
        let mut out = Vec::new();
        for i in 0..EXT2_NDIR_BLOCKS {
            let blk = inode.block(i);
            if blk != 0 {
                out.push((i as u32, blk));
            }
        }

        let indirect = inode.block(EXT2_IND_BLOCK);
        if indirect != 0 {
            for i in 0..self.ptrs_per_block() {
                let blk = self.read_indirect_entry(indirect, i)?;
                if blk != 0 {
                    out.push((EXT2_NDIR_BLOCKS as u32 + i, blk));
                }
            }
        }
        Ok(out)
    }

    pub fn free_all_blocks(&mut self, inode: &mut Inode) -> Result<(), Ext2Error> {
        for (_, phys) in self.occupied_blocks(inode)? {
            self.free_block(phys)?;
        }
        let indirect = inode.block(EXT2_IND_BLOCK);
        if indirect != 0 {
            self.free_block(indirect)?;
        }
        inode.clear_block_pointers();
        inode.set_blocks(0);
        Ok(())
    }

    pub fn read_contents(&self, inode: &Inode) -> Result<Vec<u8>, Ext2Error> {
        let size = inode.size() as usize;
        let bs = self.block_size as usize;
        let mut out = vec![0u8; size];

        for (idx, chunk) in out.chunks_mut(bs).enumerate() {
            let phys = self.get_block_number(inode, idx as u32)?;
            if phys != 0 {
                chunk.copy_from_slice(&self.block(phys)?[..chunk.len()]);
            }
        }
        Ok(out)
    }

    /// Makes `inode` hold exactly `data`.
    ///
    /// Slots that already have a block keep it; missing ones (and the
    /// indirect block) are reserved in a single allocation before anything
    /// is freed. Surplus blocks are released afterwards and the tail of the
    /// last block is zero-filled. The caller writes the inode back.
    pub fn write_contents(&mut self, inode: &mut Inode, data: &[u8]) -> Result<(), Ext2Error> {
        let bs = self.block_size as usize;
        let required = ((data.len() + bs - 1) / bs) as u64;
        if required > self.max_logical_blocks() as u64 {
            return Err(Ext2Error::FileTooLarge);
        }
        let required = required as u32;

        let mut missing = Vec::new();
        for idx in 0..required {
            if self.get_block_number(inode, idx)? == 0 {
                missing.push(idx);
            }
        }
        let need_indirect =
            required as usize > EXT2_NDIR_BLOCKS && inode.block(EXT2_IND_BLOCK) == 0;

        let count = missing.len() as u32 + need_indirect as u32;
        let mut fresh = self.allocate_blocks(count)?.into_iter();
        let mut next_fresh =
            || fresh.next().ok_or(Ext2Error::Corrupted("allocator returned the wrong block count"));

        if need_indirect {
            let indirect = next_fresh()?;
            inode.set_block(EXT2_IND_BLOCK, indirect);
            self.add_sectors(inode);
        }
        for idx in missing {
            let blk = next_fresh()?;
            self.set_block_number(inode, idx, blk)?;
            self.add_sectors(inode);
        }

        for (idx, _) in self.occupied_blocks(inode)? {
            if idx >= required {
                self.clear_block_number(inode, idx)?;
            }
        }
        let indirect = inode.block(EXT2_IND_BLOCK);
        if required as usize <= EXT2_NDIR_BLOCKS && indirect != 0 {
            self.free_block(indirect)?;
            inode.set_block(EXT2_IND_BLOCK, 0);
            self.sub_sectors(inode);
        }

        for (idx, chunk) in data.chunks(bs).enumerate() {
            let phys = self.get_block_number(inode, idx as u32)?;
            self.write_block_data(phys, chunk)?;
        }

        inode.set_size(data.len() as u32);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext2::testutil::fresh_fs;

    fn new_file(fs: &mut Ext2Fs) -> (u32, Inode) {
        let ino = fs.allocate_inode().unwrap();
        let mut inode = Inode::zeroed();
        inode.init_file(0o644, 1);
        fs.write_inode(ino, &inode).unwrap();
        (ino, inode)
    }

    #[test]
    fn inode_numbers_are_one_based() {
        let fs = fresh_fs();
        assert!(matches!(fs.read_inode(0), Err(Ext2Error::InvalidInode(0))));
        assert!(matches!(fs.read_inode(33), Err(Ext2Error::InvalidInode(33))));
        assert!(fs.read_inode(EXT2_ROOT_INO).unwrap().is_directory());
    }

    #[test]
    fn logical_index_limit() {
        let fs = fresh_fs();
        let inode = Inode::zeroed();
        assert_eq!(fs.max_logical_blocks(), 268);
        assert_eq!(fs.get_block_number(&inode, 267).unwrap(), 0);
        assert!(matches!(
            fs.get_block_number(&inode, 268),
            Err(Ext2Error::FileTooLarge)
        ));
    }

    #[test]
    fn occupied_slot_is_left_alone() {
        let mut fs = fresh_fs();
        let (_, mut inode) = new_file(&mut fs);

        let blk = fs.allocate_block_on_inode(&mut inode, 0).unwrap().unwrap();
        let free = fs.superblock.free_blocks_count();
        assert_eq!(fs.allocate_block_on_inode(&mut inode, 0).unwrap(), None);
        assert_eq!(fs.superblock.free_blocks_count(), free);
        assert_eq!(inode.block(0), blk);
        assert_eq!(inode.blocks(), 2);
    }

    #[test]
    fn indirect_block_comes_and_goes() {
        let mut fs = fresh_fs();
        let (_, mut inode) = new_file(&mut fs);
        let free = fs.superblock.free_blocks_count();

        let blk = fs.allocate_block_on_inode(&mut inode, 20).unwrap().unwrap();
        assert_ne!(inode.block(EXT2_IND_BLOCK), 0);
        assert_eq!(inode.blocks(), 4);
        assert_eq!(fs.get_block_number(&inode, 20).unwrap(), blk);
        assert_eq!(fs.superblock.free_blocks_count(), free - 2);

        fs.clear_block_number(&mut inode, 20).unwrap();
        assert_eq!(inode.block(EXT2_IND_BLOCK), 0);
        assert_eq!(inode.blocks(), 0);
        assert_eq!(fs.superblock.free_blocks_count(), free);
    }

    #[test]
    fn set_indirect_without_block_is_corruption() {
        let mut fs = fresh_fs();
        let mut inode = Inode::zeroed();
        assert!(matches!(
            fs.set_block_number(&mut inode, 15, 42),
            Err(Ext2Error::Corrupted(_))
        ));
    }

    #[test]
    fn write_contents_grows_and_shrinks() {
        let mut fs = fresh_fs();
        let (_, mut inode) = new_file(&mut fs);
        let free = fs.superblock.free_blocks_count();

        let big: Vec<u8> = (0..14 * 1024 + 10).map(|i| (i % 251) as u8).collect();
        fs.write_contents(&mut inode, &big).unwrap();
        assert_eq!(inode.size() as usize, big.len());
        // 15 data blocks plus the indirect block
        assert_eq!(inode.blocks(), 32);
        assert_eq!(fs.superblock.free_blocks_count(), free - 16);
        assert_eq!(fs.read_contents(&inode).unwrap(), big);

        fs.write_contents(&mut inode, b"short").unwrap();
        assert_eq!(inode.size(), 5);
        assert_eq!(inode.blocks(), 2);
        assert_eq!(inode.block(EXT2_IND_BLOCK), 0);
        assert_eq!(fs.superblock.free_blocks_count(), free - 1);

        let first = fs.block(inode.block(0)).unwrap();
        assert_eq!(&first[..5], b"short");
        assert!(first[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn write_contents_rejects_oversized_data() {
        let mut fs = fresh_fs();
        let (_, mut inode) = new_file(&mut fs);
        let free = fs.superblock.free_blocks_count();

        let data = vec![1u8; 268 * 1024 + 1];
        assert!(matches!(
            fs.write_contents(&mut inode, &data),
            Err(Ext2Error::FileTooLarge)
        ));
        assert_eq!(fs.superblock.free_blocks_count(), free);
    }

    #[test]
    fn free_all_blocks_releases_indirect() {
        let mut fs = fresh_fs();
        let (_, mut inode) = new_file(&mut fs);
        let free = fs.superblock.free_blocks_count();

        fs.write_contents(&mut inode, &vec![7u8; 13 * 1024]).unwrap();
        fs.free_all_blocks(&mut inode).unwrap();
        assert_eq!(inode.blocks(), 0);
        assert_eq!(fs.superblock.free_blocks_count(), free);
    }
}
