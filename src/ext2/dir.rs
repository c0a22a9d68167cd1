use std::borrow::Cow;

use super::structs::*;
use super::{Ext2Error, Ext2Fs};

pub const DIR_HEADER: usize = 8;

/// Smallest 4-byte aligned record that holds a name of `name_len` bytes.
#[inline]
pub fn rec_len_for(name_len: usize) -> usize {
    (DIR_HEADER + name_len + 3) & !3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirRecord<'a> {
    pub offset: usize,
    pub inode: u32,
    pub rec_len: usize,
    pub file_type: u8,
    pub name: &'a [u8],
}

impl DirRecord<'_> {
    /// A record with no inode or no name is free space.
    pub fn is_live(&self) -> bool {
        self.inode != 0 && !self.name.is_empty()
    }

    pub fn min_len(&self) -> usize {
        rec_len_for(self.name.len())
    }
}

pub struct DirIter<'a> {
    block: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for DirIter<'a> {
    type Item = DirRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let b = self.block;
        let pos = self.pos;
        if pos + DIR_HEADER > b.len() {
            return None;
        }

        let rec_len = rd_u16(b, pos + 4) as usize;
        let name_len = b[pos + 6] as usize;
        if rec_len < DIR_HEADER || pos + rec_len > b.len() || DIR_HEADER + name_len > rec_len {
            self.pos = b.len();
            return None;
        }

        self.pos += rec_len;
        Some(DirRecord {
            offset: pos,
            inode: rd_u32(b, pos),
            rec_len,
            file_type: b[pos + 7],
            name: &b[pos + DIR_HEADER..pos + DIR_HEADER + name_len],
        })
    }
}

pub fn iterate(block: &[u8]) -> DirIter<'_> {
    DirIter { block, pos: 0 }
}

pub fn write_record(
    block: &mut [u8],
    offset: usize,
    inode: u32,
    rec_len: usize,
    name: &[u8],
    file_type: u8,
) {
    wr_u32(block, offset, inode);
    wr_u16(block, offset + 4, rec_len as u16);
    block[offset + 6] = name.len() as u8;
    block[offset + 7] = file_type;
    block[offset + DIR_HEADER..offset + DIR_HEADER + name.len()].copy_from_slice(name);
}

/// Looks `name` up in one block. The second value is the offset of the
/// record right before the match, if any.
pub fn find_in_block<'a>(block: &'a [u8], name: &[u8]) -> Option<(DirRecord<'a>, Option<usize>)> {
    let mut prev = None;
    for rec in iterate(block) {
        if rec.is_live() && rec.name == name {
            return Some((rec, prev));
        }
        prev = Some(rec.offset);
    }
    None
}

/// Where an entry lives inside a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirSlot {
    pub logical: u32,
    pub block: u32,
    pub offset: usize,
    pub prev: Option<usize>,
    pub inode: u32,
    pub file_type: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u32,
    pub file_type: u8,
    pub name: Vec<u8>,
}

impl DirEntry {
    pub fn name_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    pub fn is_dot_or_dotdot(&self) -> bool {
        self.name == b"." || self.name == b".."
    }
}

enum Placement {
    Split { offset: usize, keep: usize, rest: usize },
    Reuse { offset: usize, rec_len: usize },
}

impl Ext2Fs {
    pub fn find_in_inode(&self, dir: &Inode, name: &[u8]) -> Result<Option<DirSlot>, Ext2Error> {
        for (logical, phys) in self.occupied_blocks(dir)? {
            if let Some((rec, prev)) = find_in_block(self.block(phys)?, name) {
                return Ok(Some(DirSlot {
                    logical,
                    block: phys,
                    offset: rec.offset,
                    prev,
                    inode: rec.inode,
                    file_type: rec.file_type,
                }));
            }
        }
        Ok(None)
    }

    /// Every live entry of `dir`, block by block.
    pub fn read_dir(&self, dir: &Inode) -> Result<Vec<DirEntry>, Ext2Error> {
        if !dir.is_directory() {
            return Err(Ext2Error::NotDirectory);
        }
        let mut out = Vec::new();
        for (_, phys) in self.occupied_blocks(dir)? {
            out.extend(iterate(self.block(phys)?).filter(|r| r.is_live()).map(|r| DirEntry {
                inode: r.inode,
                file_type: r.file_type,
                name: r.name.to_vec(),
            }));
        }
        Ok(out)
    }

    fn find_placement(&self, dir: &Inode, needed: usize) -> Result<Option<(u32, Placement)>, Ext2Error> {
        for (_, phys) in self.occupied_blocks(dir)? {
            for rec in iterate(self.block(phys)?) {
                if !rec.is_live() {
                    if rec.rec_len >= needed {
                        let place = Placement::Reuse { offset: rec.offset, rec_len: rec.rec_len };
                        return Ok(Some((phys, place)));
                    }
                    continue;
                }
                let keep = rec.min_len();
                if rec.rec_len >= keep + needed {
                    let place = Placement::Split {
                        offset: rec.offset,
                        keep,
                        rest: rec.rec_len - keep,
                    };
                    return Ok(Some((phys, place)));
                }
            }
        }
        Ok(None)
    }

    /// Adds `name -> child_ino` to directory `dir_ino`.
    ///
    /// Slack at the end of an existing record or a large enough free record
    /// is used first; otherwise the first empty logical slot gets a new
    /// block. `DirectoryFull` means every slot is taken.
    pub fn add_dir_entry(
        &mut self,
        dir_ino: u32,
        name: &str,
        child_ino: u32,
        file_type: u8,
    ) -> Result<(), Ext2Error> {
        let name_bytes = name.as_bytes();
        if name_bytes.is_empty() {
            return Err(Ext2Error::InvalidPath);
        }
        if name_bytes.len() > MAX_NAME {
            return Err(Ext2Error::NameTooLong);
        }

        let mut dir = self.read_inode(dir_ino)?;
        if !dir.is_directory() {
            return Err(Ext2Error::NotDirectory);
        }
        let needed = rec_len_for(name_bytes.len());

        match self.find_placement(&dir, needed)? {
            Some((phys, Placement::Split { offset, keep, rest })) => {
                let block = self.block_mut(phys)?;
                wr_u16(block, offset + 4, keep as u16);
                write_record(block, offset + keep, child_ino, rest, name_bytes, file_type);
                log::debug!("[dir] {} -> {} split into block {}", name, child_ino, phys);
            }
            Some((phys, Placement::Reuse { offset, rec_len })) => {
                let block = self.block_mut(phys)?;
                write_record(block, offset, child_ino, rec_len, name_bytes, file_type);
                log::debug!("[dir] {} -> {} reused free record in block {}", name, child_ino, phys);
            }
            None => {
                let max = self.max_logical_blocks();
                let mut slot = None;
                for idx in 0..max {
                    if self.get_block_number(&dir, idx)? == 0 {
                        slot = Some(idx);
                        break;
                    }
                }
                let idx = slot.ok_or(Ext2Error::DirectoryFull)?;

                let phys = self
                    .allocate_block_on_inode(&mut dir, idx)?
                    .ok_or(Ext2Error::Corrupted("directory slot filled behind our back"))?;
                let bs = self.block_size as usize;
                write_record(self.block_mut(phys)?, 0, child_ino, bs, name_bytes, file_type);

                let end = (idx + 1) * self.block_size;
                if dir.size() < end {
                    dir.set_size(end);
                }
                log::debug!("[dir] {} -> {} in new block {} (slot {})", name, child_ino, phys, idx);
            }
        }

        let now = self.get_timestamp();
        dir.set_mtime(now);
        dir.set_ctime(now);
        self.write_inode(dir_ino, &dir)
    }

    /// Unlinks `name` from `dir_ino` and returns the inode it pointed to.
    ///
    /// The first record of a block becomes a free record; any other is
    /// folded into its predecessor. A block left without live records is
    /// released.
    pub fn remove_dir_entry(&mut self, dir_ino: u32, name: &str) -> Result<u32, Ext2Error> {
        let mut dir = self.read_inode(dir_ino)?;
        if !dir.is_directory() {
            return Err(Ext2Error::NotDirectory);
        }
        let slot = self
            .find_in_inode(&dir, name.as_bytes())?
            .ok_or(Ext2Error::NotFound)?;

        let block = self.block_mut(slot.block)?;
        match slot.prev {
            None => {
                wr_u32(block, slot.offset, 0);
                block[slot.offset + 6] = 0;
                block[slot.offset + 7] = FT_UNKNOWN;
            }
            Some(prev) => {
                let merged = rd_u16(block, prev + 4) + rd_u16(block, slot.offset + 4);
                wr_u16(block, prev + 4, merged);
            }
        }

        let still_used = iterate(self.block(slot.block)?).any(|r| r.is_live());
        if !still_used {
            self.clear_block_number(&mut dir, slot.logical)?;
            let last = self
                .occupied_blocks(&dir)?
                .last()
                .map(|&(logical, _)| logical + 1)
                .unwrap_or(0);
            let end = last * self.block_size;
            if dir.size() > end {
                dir.set_size(end);
            }
            log::debug!("[dir] released empty block {} of dir {}", slot.block, dir_ino);
        }

        let now = self.get_timestamp();
        dir.set_mtime(now);
        dir.set_ctime(now);
        self.write_inode(dir_ino, &dir)?;

        log::debug!("[dir] removed {} -> {} from dir {}", name, slot.inode, dir_ino);
        Ok(slot.inode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext2::testutil::fresh_fs;

    fn rec_len_sum(fs: &Ext2Fs, phys: u32) -> usize {
        iterate(fs.block(phys).unwrap()).map(|r| r.rec_len).sum()
    }

    fn root(fs: &Ext2Fs) -> Inode {
        fs.read_inode(EXT2_ROOT_INO).unwrap()
    }

    #[test]
    fn record_sizes() {
        assert_eq!(rec_len_for(1), 12);
        assert_eq!(rec_len_for(4), 12);
        assert_eq!(rec_len_for(5), 16);
        assert_eq!(rec_len_for(255), 264);
    }

    #[test]
    fn iterator_stops_on_zero_rec_len() {
        let mut block = vec![0u8; 1024];
        write_record(&mut block, 0, 5, 12, b"a", FT_REG_FILE);
        let names: Vec<_> = iterate(&block).map(|r| r.name.to_vec()).collect();
        assert_eq!(names, vec![b"a".to_vec()]);
    }

    #[test]
    fn iterator_stops_on_record_crossing_block_end() {
        let mut block = vec![0u8; 64];
        write_record(&mut block, 0, 5, 12, b"a", FT_REG_FILE);
        write_record(&mut block, 12, 6, 200, b"b", FT_REG_FILE);
        assert_eq!(iterate(&block).count(), 1);
    }

    #[test]
    fn fresh_root_has_dots() {
        let fs = fresh_fs();
        let root = root(&fs);
        let dot = fs.find_in_inode(&root, b".").unwrap().unwrap();
        assert_eq!(dot.inode, EXT2_ROOT_INO);
        assert_eq!(dot.prev, None);

        let dotdot = fs.find_in_inode(&root, b"..").unwrap().unwrap();
        assert_eq!(dotdot.prev, Some(0));
        assert!(fs.find_in_inode(&root, b"nope").unwrap().is_none());
    }

    #[test]
    fn insert_splits_last_record() {
        let mut fs = fresh_fs();
        let free = fs.superblock.free_blocks_count();
        fs.add_dir_entry(EXT2_ROOT_INO, "hello", 12, FT_REG_FILE).unwrap();

        let root = root(&fs);
        let slot = fs.find_in_inode(&root, b"hello").unwrap().unwrap();
        assert_eq!(slot.inode, 12);
        assert_eq!(slot.logical, 0);
        assert_eq!(rec_len_sum(&fs, slot.block), 1024);
        assert_eq!(fs.superblock.free_blocks_count(), free);
    }

    #[test]
    fn insert_spills_into_new_block() {
        let mut fs = fresh_fs();
        let long = "x".repeat(200);
        for i in 0..5 {
            fs.add_dir_entry(EXT2_ROOT_INO, &format!("{}{}", long, i), 12, FT_REG_FILE)
                .unwrap();
        }

        let root = root(&fs);
        assert_eq!(root.size(), 2048);
        assert_eq!(root.blocks(), 4);
        let slot = fs
            .find_in_inode(&root, format!("{}4", long).as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(slot.logical, 1);
        assert_eq!(slot.offset, 0);
        assert_eq!(rec_len_sum(&fs, slot.block), 1024);
    }

    #[test]
    fn name_length_limits() {
        let mut fs = fresh_fs();
        let long = "n".repeat(256);
        assert!(matches!(
            fs.add_dir_entry(EXT2_ROOT_INO, &long, 12, FT_REG_FILE),
            Err(Ext2Error::NameTooLong)
        ));
        fs.add_dir_entry(EXT2_ROOT_INO, &long[..255], 12, FT_REG_FILE)
            .unwrap();
    }

    #[test]
    fn delete_folds_into_predecessor() {
        let mut fs = fresh_fs();
        fs.add_dir_entry(EXT2_ROOT_INO, "a", 12, FT_REG_FILE).unwrap();
        fs.add_dir_entry(EXT2_ROOT_INO, "b", 13, FT_REG_FILE).unwrap();

        assert_eq!(fs.remove_dir_entry(EXT2_ROOT_INO, "a").unwrap(), 12);
        let root = root(&fs);
        assert!(fs.find_in_inode(&root, b"a").unwrap().is_none());
        let b = fs.find_in_inode(&root, b"b").unwrap().unwrap();
        assert_eq!(rec_len_sum(&fs, b.block), 1024);
        assert!(matches!(
            fs.remove_dir_entry(EXT2_ROOT_INO, "a"),
            Err(Ext2Error::NotFound)
        ));
    }

    #[test]
    fn emptied_block_is_released_and_size_shrinks() {
        let mut fs = fresh_fs();
        let long = "y".repeat(200);
        for i in 0..5 {
            fs.add_dir_entry(EXT2_ROOT_INO, &format!("{}{}", long, i), 12, FT_REG_FILE)
                .unwrap();
        }
        let free = fs.superblock.free_blocks_count();

        fs.remove_dir_entry(EXT2_ROOT_INO, &format!("{}4", long)).unwrap();
        let root = root(&fs);
        assert_eq!(root.size(), 1024);
        assert_eq!(root.block(1), 0);
        assert_eq!(root.blocks(), 2);
        assert_eq!(fs.superblock.free_blocks_count(), free + 1);
    }

    #[test]
    fn first_record_becomes_free_record_and_is_reused() {
        let mut fs = fresh_fs();
        let long = "z".repeat(200);
        for i in 0..5 {
            fs.add_dir_entry(EXT2_ROOT_INO, &format!("{}{}", long, i), 12, FT_REG_FILE)
                .unwrap();
        }
        fs.add_dir_entry(EXT2_ROOT_INO, "tail", 13, FT_REG_FILE).unwrap();

        let name = format!("{}4", long);
        fs.remove_dir_entry(EXT2_ROOT_INO, &name).unwrap();

        let root = root(&fs);
        let phys = root.block(1);
        let first = iterate(fs.block(phys).unwrap()).next().unwrap();
        assert!(!first.is_live());
        assert_eq!(first.inode, 0);
        assert_eq!(first.rec_len, 208);

        fs.add_dir_entry(EXT2_ROOT_INO, "again", 14, FT_REG_FILE).unwrap();
        let slot = fs.find_in_inode(&root, b"again").unwrap().unwrap();
        assert_eq!(slot.block, phys);
        assert_eq!(slot.offset, 0);
    }

    #[test]
    fn full_directory_is_reported() {
        let mut fs = fresh_fs();
        let filler = fs.allocate_block().unwrap();
        let indirect = fs.allocate_block().unwrap();
        {
            let block = fs.block_mut(filler).unwrap();
            let name = [b'f'; 255];
            write_record(block, 0, 12, 264, &name, FT_REG_FILE);
            write_record(block, 264, 12, 264, &name, FT_REG_FILE);
            write_record(block, 528, 12, 496, &name, FT_REG_FILE);
        }
        for i in 0..256 {
            fs.write_indirect_entry(indirect, i, filler).unwrap();
        }

        let mut dir = root(&fs);
        for i in 0..EXT2_NDIR_BLOCKS {
            dir.set_block(i, filler);
        }
        dir.set_block(EXT2_IND_BLOCK, indirect);
        fs.write_inode(EXT2_ROOT_INO, &dir).unwrap();

        let name = "g".repeat(250);
        assert!(matches!(
            fs.add_dir_entry(EXT2_ROOT_INO, &name, 13, FT_REG_FILE),
            Err(Ext2Error::DirectoryFull)
        ));
    }
}
