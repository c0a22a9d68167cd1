use super::structs::*;
use super::{Ext2Error, Ext2Fs};

pub const DEFAULT_FILE_MODE: u16 = 0o644;
pub const DEFAULT_DIR_MODE: u16 = 0o755;

impl Ext2Fs {
    /// Blocks (data plus indirect) a file of `len` bytes occupies.
    pub fn blocks_for_len(&self, len: u64) -> Result<u32, Ext2Error> {
        let bs = self.block_size as u64;
        let data = (len + bs - 1) / bs;
        if data > self.max_logical_blocks() as u64 {
            return Err(Ext2Error::FileTooLarge);
        }
        let data = data as u32;
        let indirect = (data as usize > EXT2_NDIR_BLOCKS) as u32;
        Ok(data + indirect)
    }

    /// Frees a half-built inode after a failed create and passes the
    /// first error on.
    fn abandon_inode(&mut self, inode_num: u32, err: Ext2Error) -> Ext2Error {
        log::warn!("[write] rolling back inode {}: {}", inode_num, err);
        match self.free_inode(inode_num) {
            Ok(()) => err,
            Err(e) => {
                log::error!("[write] rollback of inode {} failed: {}", inode_num, e);
                err
            }
        }
    }

    pub fn create_file(&mut self, parent_ino: u32, name: &str, data: &[u8]) -> Result<u32, Ext2Error> {
        let needed = self.blocks_for_len(data.len() as u64)?;
        if needed > self.superblock.free_blocks_count() {
            return Err(Ext2Error::NoSpace);
        }

        let new_ino = self.allocate_inode()?;
        let now = self.get_timestamp();
        let mut inode = Inode::zeroed();
        inode.init_file(DEFAULT_FILE_MODE, now);
        self.write_inode(new_ino, &inode)?;

        let result = self
            .write_contents(&mut inode, data)
            .and_then(|()| self.write_inode(new_ino, &inode))
            .and_then(|()| self.add_dir_entry(parent_ino, name, new_ino, FT_REG_FILE));
        if let Err(e) = result {
            return Err(self.abandon_inode(new_ino, e));
        }

        log::debug!("[write] file {} -> inode {} ({} bytes)", name, new_ino, data.len());
        Ok(new_ino)
    }

    /// Replaces the contents of an existing regular file in place.
    pub fn overwrite_file(&mut self, inode_num: u32, data: &[u8]) -> Result<(), Ext2Error> {
        let mut inode = self.read_inode(inode_num)?;
        if !inode.is_regular() {
            return Err(Ext2Error::AlreadyExists);
        }
        self.write_contents(&mut inode, data)?;

        let now = self.get_timestamp();
        inode.set_mtime(now);
        inode.set_ctime(now);
        self.write_inode(inode_num, &inode)?;

        log::debug!("[write] overwrote inode {} ({} bytes)", inode_num, data.len());
        Ok(())
    }

    /// New directory with `.` and `..`, linked into `parent_ino`.
    pub fn create_dir(&mut self, parent_ino: u32, name: &str, mode: u16) -> Result<u32, Ext2Error> {
        let new_ino = self.allocate_inode()?;
        let now = self.get_timestamp();
        let mut inode = Inode::zeroed();
        inode.init_dir(mode, now);
        self.write_inode(new_ino, &inode)?;
        self.group.inc_used_dirs();
        self.flush_group_desc()?;

        let result = self
            .add_dir_entry(new_ino, ".", new_ino, FT_DIR)
            .and_then(|()| self.add_dir_entry(new_ino, "..", parent_ino, FT_DIR))
            .and_then(|()| self.add_dir_entry(parent_ino, name, new_ino, FT_DIR));
        if let Err(e) = result {
            return Err(self.abandon_inode(new_ino, e));
        }

        let mut parent = self.read_inode(parent_ino)?;
        parent.set_links_count(parent.links_count().saturating_add(1));
        parent.set_ctime(now);
        self.write_inode(parent_ino, &parent)?;

        log::debug!("[write] dir {} -> inode {} under {}", name, new_ino, parent_ino);
        Ok(new_ino)
    }

    /// Symlink whose target is kept in its first data block.
    pub fn create_symlink(
        &mut self,
        parent_ino: u32,
        name: &str,
        target: &str,
    ) -> Result<u32, Ext2Error> {
        let target_bytes = target.as_bytes();
        if target_bytes.len() > self.block_size as usize {
            return Err(Ext2Error::NameTooLong);
        }
        if self.superblock.free_blocks_count() == 0 {
            return Err(Ext2Error::NoSpace);
        }

        let new_ino = self.allocate_inode()?;
        let now = self.get_timestamp();
        let mut inode = Inode::zeroed();
        inode.init_symlink(now);
        self.write_inode(new_ino, &inode)?;

        let result = self
            .write_contents(&mut inode, target_bytes)
            .and_then(|()| self.write_inode(new_ino, &inode))
            .and_then(|()| self.add_dir_entry(parent_ino, name, new_ino, FT_SYMLINK));
        if let Err(e) = result {
            return Err(self.abandon_inode(new_ino, e));
        }

        log::debug!("[write] symlink {} -> {:?} as inode {}", name, target, new_ino);
        Ok(new_ino)
    }
}
