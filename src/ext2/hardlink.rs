use super::structs::*;
use super::{Ext2Error, Ext2Fs};

impl Ext2Fs {
    /// Adds another name for `target_ino`. The entry goes in first so a
    /// full directory leaves the link count untouched.
    pub fn hardlink(
        &mut self,
        parent_ino: u32,
        name: &str,
        target_ino: u32,
        file_type: u8,
    ) -> Result<(), Ext2Error> {
        let target = self.read_inode(target_ino)?;
        if target.is_directory() {
            return Err(Ext2Error::IsDirectory);
        }

        self.add_dir_entry(parent_ino, name, target_ino, file_type)?;

        let mut target = self.read_inode(target_ino)?;
        target.set_links_count(target.links_count().saturating_add(1));
        target.set_ctime(self.get_timestamp());
        self.write_inode(target_ino, &target)?;

        log::debug!(
            "[link] {} -> inode {} (links {})",
            name,
            target_ino,
            target.links_count()
        );
        Ok(())
    }

    /// Drops one name of a non-directory inode and frees the inode once no
    /// name is left.
    pub fn unlink(&mut self, parent_ino: u32, name: &str) -> Result<(), Ext2Error> {
        let parent = self.read_inode(parent_ino)?;
        let slot = self
            .find_in_inode(&parent, name.as_bytes())?
            .ok_or(Ext2Error::NotFound)?;
        if self.entry_kind(slot.file_type, slot.inode)? == InodeType::Directory {
            return Err(Ext2Error::IsDirectory);
        }

        let target_ino = self.remove_dir_entry(parent_ino, name)?;
        let mut inode = self.read_inode(target_ino)?;
        let links = inode.links_count();

        if links > 1 {
            inode.set_links_count(links - 1);
            inode.set_ctime(self.get_timestamp());
            self.write_inode(target_ino, &inode)?;
            log::debug!("[link] {} removed, inode {} keeps {} links", name, target_ino, links - 1);
        } else {
            self.free_inode(target_ino)?;
            log::debug!("[link] {} removed, inode {} freed", name, target_ino);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext2::dir::write_record;
    use crate::ext2::testutil::fresh_fs;

    #[test]
    fn link_then_unlink_both_names() {
        let mut fs = fresh_fs();
        let free_blocks = fs.superblock.free_blocks_count();
        let free_inodes = fs.superblock.free_inodes_count();

        let ino = fs.create_file(EXT2_ROOT_INO, "a", b"data").unwrap();
        fs.hardlink(EXT2_ROOT_INO, "b", ino, FT_REG_FILE).unwrap();
        assert_eq!(fs.read_inode(ino).unwrap().links_count(), 2);

        fs.unlink(EXT2_ROOT_INO, "a").unwrap();
        assert_eq!(fs.read_inode(ino).unwrap().links_count(), 1);
        assert!(fs.is_inode_used(ino).unwrap());
        assert_eq!(fs.resolve("/b").unwrap().unwrap().inode, ino);

        fs.unlink(EXT2_ROOT_INO, "b").unwrap();
        assert!(!fs.is_inode_used(ino).unwrap());
        assert_eq!(fs.superblock.free_blocks_count(), free_blocks);
        assert_eq!(fs.superblock.free_inodes_count(), free_inodes);
    }

    #[test]
    fn failed_insert_keeps_link_count() {
        let mut fs = fresh_fs();
        let ino = fs.create_file(EXT2_ROOT_INO, "a", b"data").unwrap();

        // every logical slot of the root points at one packed block
        let packed = fs.allocate_block().unwrap();
        let indirect = fs.allocate_block().unwrap();
        {
            let block = fs.block_mut(packed).unwrap();
            let name = [b'p'; 255];
            write_record(block, 0, ino, 264, &name, FT_REG_FILE);
            write_record(block, 264, ino, 264, &name, FT_REG_FILE);
            write_record(block, 528, ino, 496, &name, FT_REG_FILE);
        }
        for i in 0..fs.ptrs_per_block() {
            fs.write_indirect_entry(indirect, i, packed).unwrap();
        }
        let mut root = fs.read_inode(EXT2_ROOT_INO).unwrap();
        for i in 0..EXT2_NDIR_BLOCKS {
            root.set_block(i, packed);
        }
        root.set_block(EXT2_IND_BLOCK, indirect);
        fs.write_inode(EXT2_ROOT_INO, &root).unwrap();

        let name = "q".repeat(250);
        assert!(matches!(
            fs.hardlink(EXT2_ROOT_INO, &name, ino, FT_REG_FILE),
            Err(Ext2Error::DirectoryFull)
        ));
        assert_eq!(fs.read_inode(ino).unwrap().links_count(), 1);
    }

    #[test]
    fn directories_cannot_be_linked_or_unlinked() {
        let mut fs = fresh_fs();
        assert!(matches!(
            fs.hardlink(EXT2_ROOT_INO, "lf", 11, FT_DIR),
            Err(Ext2Error::IsDirectory)
        ));
        assert!(matches!(
            fs.unlink(EXT2_ROOT_INO, "lost+found"),
            Err(Ext2Error::IsDirectory)
        ));
        assert!(matches!(
            fs.unlink(EXT2_ROOT_INO, "ghost"),
            Err(Ext2Error::NotFound)
        ));
    }
}
