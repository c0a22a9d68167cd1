//! On-disk records of a 1 KiB-block ext2 image.
//!
//! Each record is kept as its raw little-endian bytes and decoded field by
//! field through the offsets below, so a record read from an image and
//! written back is byte-identical apart from the fields that were set.

pub const EXT2_MAGIC: u16 = 0xEF53;

pub const BLOCK_SIZE: usize = 1024;
pub const SUPERBLOCK_OFFSET: usize = 1024;
pub const SUPERBLOCK_SIZE: usize = 1024;
pub const GROUP_DESC_BLOCK: u32 = 2;
pub const GROUP_DESC_SIZE: usize = 32;
pub const INODE_SIZE: usize = 128;

pub const MAX_NAME: usize = 255;

pub const EXT2_NDIR_BLOCKS: usize = 12;
pub const EXT2_IND_BLOCK: usize = 12;
pub const EXT2_N_BLOCKS: usize = 15;

pub const EXT2_ROOT_INO: u32 = 2;
pub const EXT2_FIRST_INO_OLD: u32 = 11;
pub const EXT2_DYNAMIC_REV: u32 = 1;

pub const EXT2_STATE_VALID: u16 = 0x0001;
pub const EXT2_ERRORS_CONTINUE: u16 = 1;
pub const FEATURE_INCOMPAT_FILETYPE: u32 = 0x0002;

/// Superblock field offsets.
pub mod sb_off {
    pub const INODES_COUNT: usize = 0;
    pub const BLOCKS_COUNT: usize = 4;
    pub const R_BLOCKS_COUNT: usize = 8;
    pub const FREE_BLOCKS: usize = 12;
    pub const FREE_INODES: usize = 16;
    pub const FIRST_DATA_BLOCK: usize = 20;
    pub const LOG_BLOCK_SIZE: usize = 24;
    pub const LOG_FRAG_SIZE: usize = 28;
    pub const BLOCKS_PER_GROUP: usize = 32;
    pub const FRAGS_PER_GROUP: usize = 36;
    pub const INODES_PER_GROUP: usize = 40;
    pub const WTIME: usize = 48;
    pub const MAX_MNT_COUNT: usize = 54;
    pub const MAGIC: usize = 56;
    pub const STATE: usize = 58;
    pub const ERRORS: usize = 60;
    pub const LASTCHECK: usize = 64;
    pub const REV_LEVEL: usize = 76;
    pub const FIRST_INO: usize = 84;
    pub const INODE_SIZE: usize = 88;
    pub const FEATURE_INCOMPAT: usize = 96;
    pub const UUID: usize = 104;
    pub const VOLUME_NAME: usize = 120;
}

/// Group descriptor field offsets.
pub mod gd_off {
    pub const BLOCK_BITMAP: usize = 0;
    pub const INODE_BITMAP: usize = 4;
    pub const INODE_TABLE: usize = 8;
    pub const FREE_BLOCKS: usize = 12;
    pub const FREE_INODES: usize = 14;
    pub const USED_DIRS: usize = 16;
}

mod ino_off {
    pub const MODE: usize = 0;
    pub const SIZE: usize = 4;
    pub const ATIME: usize = 8;
    pub const CTIME: usize = 12;
    pub const MTIME: usize = 16;
    pub const DTIME: usize = 20;
    pub const LINKS: usize = 26;
    pub const BLOCKS: usize = 28;
    pub const BLOCK: usize = 40;
}

#[inline]
pub fn rd_u16(b: &[u8], o: usize) -> u16 {
    u16::from_le_bytes([b[o], b[o + 1]])
}

#[inline]
pub fn rd_u32(b: &[u8], o: usize) -> u32 {
    u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]])
}

#[inline]
pub fn wr_u16(b: &mut [u8], o: usize, v: u16) {
    b[o..o + 2].copy_from_slice(&v.to_le_bytes());
}

#[inline]
pub fn wr_u32(b: &mut [u8], o: usize, v: u32) {
    b[o..o + 4].copy_from_slice(&v.to_le_bytes());
}

fn copy_record<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut data = [0u8; N];
    data.copy_from_slice(&bytes[..N]);
    data
}

#[derive(Clone, Copy)]
pub struct Superblock {
    pub data: [u8; SUPERBLOCK_SIZE],
}

impl Superblock {
    pub const fn zeroed() -> Self {
        Self {
            data: [0; SUPERBLOCK_SIZE],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: copy_record(bytes),
        }
    }

    pub fn put_u16(&mut self, offset: usize, val: u16) {
        wr_u16(&mut self.data, offset, val);
    }

    pub fn put_u32(&mut self, offset: usize, val: u32) {
        wr_u32(&mut self.data, offset, val);
    }

    fn u32_at(&self, offset: usize) -> u32 {
        rd_u32(&self.data, offset)
    }

    pub fn inodes_count(&self) -> u32 {
        self.u32_at(sb_off::INODES_COUNT)
    }

    pub fn blocks_count(&self) -> u32 {
        self.u32_at(sb_off::BLOCKS_COUNT)
    }

    pub fn free_blocks_count(&self) -> u32 {
        self.u32_at(sb_off::FREE_BLOCKS)
    }

    pub fn free_inodes_count(&self) -> u32 {
        self.u32_at(sb_off::FREE_INODES)
    }

    pub fn first_data_block(&self) -> u32 {
        self.u32_at(sb_off::FIRST_DATA_BLOCK)
    }

    pub fn blocks_per_group(&self) -> u32 {
        self.u32_at(sb_off::BLOCKS_PER_GROUP)
    }

    pub fn inodes_per_group(&self) -> u32 {
        self.u32_at(sb_off::INODES_PER_GROUP)
    }

    pub fn magic(&self) -> u16 {
        rd_u16(&self.data, sb_off::MAGIC)
    }

    pub fn set_free_blocks_count(&mut self, v: u32) {
        self.put_u32(sb_off::FREE_BLOCKS, v);
    }

    pub fn set_free_inodes_count(&mut self, v: u32) {
        self.put_u32(sb_off::FREE_INODES, v);
    }

    pub fn set_wtime(&mut self, t: u32) {
        self.put_u32(sb_off::WTIME, t);
    }

    pub fn block_size(&self) -> u32 {
        // a garbage shift would overflow; report it as an unusable size
        1024u32
            .checked_shl(self.u32_at(sb_off::LOG_BLOCK_SIZE))
            .unwrap_or(0)
    }

    fn dynamic(&self) -> bool {
        self.u32_at(sb_off::REV_LEVEL) >= EXT2_DYNAMIC_REV
    }

    /// Inode record size; revision 0 images always use 128 bytes.
    pub fn inode_size_val(&self) -> u32 {
        if self.dynamic() {
            rd_u16(&self.data, sb_off::INODE_SIZE) as u32
        } else {
            INODE_SIZE as u32
        }
    }

    /// First inode that is not reserved.
    pub fn first_ino(&self) -> u32 {
        if self.dynamic() {
            self.u32_at(sb_off::FIRST_INO)
        } else {
            EXT2_FIRST_INO_OLD
        }
    }

    pub fn has_filetype(&self) -> bool {
        self.u32_at(sb_off::FEATURE_INCOMPAT) & FEATURE_INCOMPAT_FILETYPE != 0
    }

    pub fn volume_name(&self) -> &str {
        let raw = &self.data[sb_off::VOLUME_NAME..sb_off::VOLUME_NAME + 16];
        let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        std::str::from_utf8(&raw[..len]).unwrap_or("")
    }
}

#[derive(Clone, Copy)]
pub struct GroupDesc {
    pub data: [u8; GROUP_DESC_SIZE],
}

impl GroupDesc {
    pub const fn zeroed() -> Self {
        Self {
            data: [0; GROUP_DESC_SIZE],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: copy_record(bytes),
        }
    }

    pub fn put_u16(&mut self, offset: usize, val: u16) {
        wr_u16(&mut self.data, offset, val);
    }

    pub fn put_u32(&mut self, offset: usize, val: u32) {
        wr_u32(&mut self.data, offset, val);
    }

    pub fn block_bitmap(&self) -> u32 {
        rd_u32(&self.data, gd_off::BLOCK_BITMAP)
    }

    pub fn inode_bitmap(&self) -> u32 {
        rd_u32(&self.data, gd_off::INODE_BITMAP)
    }

    pub fn inode_table(&self) -> u32 {
        rd_u32(&self.data, gd_off::INODE_TABLE)
    }

    pub fn free_blocks(&self) -> u16 {
        rd_u16(&self.data, gd_off::FREE_BLOCKS)
    }

    pub fn free_inodes(&self) -> u16 {
        rd_u16(&self.data, gd_off::FREE_INODES)
    }

    pub fn used_dirs(&self) -> u16 {
        rd_u16(&self.data, gd_off::USED_DIRS)
    }

    pub fn set_free_blocks(&mut self, v: u16) {
        self.put_u16(gd_off::FREE_BLOCKS, v);
    }

    pub fn set_free_inodes(&mut self, v: u16) {
        self.put_u16(gd_off::FREE_INODES, v);
    }

    pub fn inc_used_dirs(&mut self) {
        let n = self.used_dirs().saturating_add(1);
        self.put_u16(gd_off::USED_DIRS, n);
    }

    pub fn dec_used_dirs(&mut self) {
        let n = self.used_dirs().saturating_sub(1);
        self.put_u16(gd_off::USED_DIRS, n);
    }
}

pub const S_IFMT: u16 = 0xF000;
pub const S_IFIFO: u16 = 0x1000;
pub const S_IFCHR: u16 = 0x2000;
pub const S_IFDIR: u16 = 0x4000;
pub const S_IFBLK: u16 = 0x6000;
pub const S_IFREG: u16 = 0x8000;
pub const S_IFLNK: u16 = 0xA000;
pub const S_IFSOCK: u16 = 0xC000;

#[derive(Clone, Copy)]
pub struct Inode {
    pub data: [u8; INODE_SIZE],
}

impl Inode {
    pub const fn zeroed() -> Self {
        Self {
            data: [0; INODE_SIZE],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: copy_record(bytes),
        }
    }

    pub fn mode(&self) -> u16 {
        rd_u16(&self.data, ino_off::MODE)
    }

    pub fn size(&self) -> u32 {
        rd_u32(&self.data, ino_off::SIZE)
    }

    pub fn dtime(&self) -> u32 {
        rd_u32(&self.data, ino_off::DTIME)
    }

    pub fn links_count(&self) -> u16 {
        rd_u16(&self.data, ino_off::LINKS)
    }

    /// 512-byte sectors held, indirect block included.
    pub fn blocks(&self) -> u32 {
        rd_u32(&self.data, ino_off::BLOCKS)
    }

    pub fn block(&self, index: usize) -> u32 {
        if index >= EXT2_N_BLOCKS {
            return 0;
        }
        rd_u32(&self.data, ino_off::BLOCK + index * 4)
    }

    pub fn file_type(&self) -> InodeType {
        match self.mode() & S_IFMT {
            S_IFREG => InodeType::Regular,
            S_IFDIR => InodeType::Directory,
            S_IFLNK => InodeType::Symlink,
            S_IFCHR => InodeType::CharDevice,
            S_IFBLK => InodeType::BlockDevice,
            S_IFIFO => InodeType::Fifo,
            S_IFSOCK => InodeType::Socket,
            _ => InodeType::Unknown,
        }
    }

    pub fn is_regular(&self) -> bool {
        self.file_type() == InodeType::Regular
    }

    pub fn is_directory(&self) -> bool {
        self.file_type() == InodeType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == InodeType::Symlink
    }

    pub fn set_size(&mut self, size: u32) {
        wr_u32(&mut self.data, ino_off::SIZE, size);
    }

    pub fn set_ctime(&mut self, t: u32) {
        wr_u32(&mut self.data, ino_off::CTIME, t);
    }

    pub fn set_mtime(&mut self, t: u32) {
        wr_u32(&mut self.data, ino_off::MTIME, t);
    }

    pub fn set_dtime(&mut self, t: u32) {
        wr_u32(&mut self.data, ino_off::DTIME, t);
    }

    pub fn set_links_count(&mut self, count: u16) {
        wr_u16(&mut self.data, ino_off::LINKS, count);
    }

    pub fn set_blocks(&mut self, blocks: u32) {
        wr_u32(&mut self.data, ino_off::BLOCKS, blocks);
    }

    pub fn set_block(&mut self, index: usize, val: u32) {
        if index < EXT2_N_BLOCKS {
            wr_u32(&mut self.data, ino_off::BLOCK + index * 4, val);
        }
    }

    pub fn clear_block_pointers(&mut self) {
        let start = ino_off::BLOCK;
        self.data[start..start + EXT2_N_BLOCKS * 4].fill(0);
    }

    /// Wipes the record and stamps a fresh inode of the given type.
    fn init(&mut self, type_bits: u16, perm: u16, links: u16, now: u32) {
        self.data = [0; INODE_SIZE];
        wr_u16(&mut self.data, ino_off::MODE, type_bits | (perm & !S_IFMT));
        for off in [ino_off::ATIME, ino_off::CTIME, ino_off::MTIME] {
            wr_u32(&mut self.data, off, now);
        }
        self.set_links_count(links);
    }

    pub fn init_file(&mut self, perm: u16, now: u32) {
        self.init(S_IFREG, perm, 1, now);
    }

    /// Two links: the parent's entry and the directory's own `.`.
    pub fn init_dir(&mut self, perm: u16, now: u32) {
        self.init(S_IFDIR, perm, 2, now);
    }

    pub fn init_symlink(&mut self, now: u32) {
        self.init(S_IFLNK, 0o777, 1, now);
    }
}

pub const FT_UNKNOWN: u8 = 0;
pub const FT_REG_FILE: u8 = 1;
pub const FT_DIR: u8 = 2;
pub const FT_CHRDEV: u8 = 3;
pub const FT_BLKDEV: u8 = 4;
pub const FT_FIFO: u8 = 5;
pub const FT_SOCK: u8 = 6;
pub const FT_SYMLINK: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    Unknown,
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
}

const TYPE_TAGS: [(InodeType, u8); 7] = [
    (InodeType::Regular, FT_REG_FILE),
    (InodeType::Directory, FT_DIR),
    (InodeType::CharDevice, FT_CHRDEV),
    (InodeType::BlockDevice, FT_BLKDEV),
    (InodeType::Fifo, FT_FIFO),
    (InodeType::Socket, FT_SOCK),
    (InodeType::Symlink, FT_SYMLINK),
];

impl InodeType {
    /// Tag stored in a directory record for this type.
    pub fn dir_entry_type(self) -> u8 {
        TYPE_TAGS
            .iter()
            .find(|&&(kind, _)| kind == self)
            .map_or(FT_UNKNOWN, |&(_, tag)| tag)
    }

    pub fn from_dir_entry_type(tag: u8) -> Self {
        TYPE_TAGS
            .iter()
            .find(|&&(_, t)| t == tag)
            .map_or(InodeType::Unknown, |&(kind, _)| kind)
    }
}
