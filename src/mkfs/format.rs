use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use super::layout::{FsLayout, BLOCKS_PER_GROUP};
use super::params::{MkfsParams, LABEL_LEN};
use crate::ext2::bitmap::set_used;
use crate::ext2::dir::write_record;
use crate::ext2::image::DiskImage;
use crate::ext2::structs::*;

#[derive(Debug, Error)]
pub enum MkfsError {
    #[error("disk too small for an ext2 filesystem")]
    DiskTooSmall,
    #[error("filesystem would need more than one block group")]
    TooManyGroups,
    #[error("invalid parameters: {0}")]
    InvalidParams(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MkfsReport {
    pub block_size:         u32,
    pub inode_size:         u32,
    pub total_blocks:       u32,
    pub total_inodes:       u32,
    pub inode_table_blocks: u32,
    pub free_blocks:        u32,
    pub free_inodes:        u32,
}

fn make_uuid(seed: u32) -> [u8; 16] {
    let mut u = [0u8; 16];
    let a = seed.wrapping_mul(0x6C62272E).wrapping_add(0xC965ABB7);
    let b = a.wrapping_mul(0x9E3779B9).wrapping_add(seed);
    let c = b.wrapping_mul(0xD2A98B26).wrapping_add(a);
    let d = c.wrapping_mul(0x45678913).wrapping_add(b);
    u[0..4].copy_from_slice(&a.to_le_bytes());
    u[4..8].copy_from_slice(&b.to_le_bytes());
    u[8..12].copy_from_slice(&c.to_le_bytes());
    u[12..16].copy_from_slice(&d.to_le_bytes());
    u[6] = (u[6] & 0x0F) | 0x40;
    u[8] = (u[8] & 0x3F) | 0x80;
    u
}

fn bitmap_set_range(buf: &mut [u8], first: u32, last: u32) {
    for bit in first..=last {
        set_used(buf, bit, true);
    }
}

/// Bits past the end of the group never map to anything; keep them set.
fn bitmap_mark_unused_tail(buf: &mut [u8], first_invalid: u32) {
    let total_bits = buf.len() as u32 * 8;
    for bit in first_invalid..total_bits {
        set_used(buf, bit, true);
    }
}

fn block_at(buf: &mut [u8], block: u32) -> &mut [u8] {
    let start = block as usize * BLOCK_SIZE;
    &mut buf[start..start + BLOCK_SIZE]
}

fn dir_inode(links: u16, block: u32, now: u32) -> Inode {
    let mut inode = Inode::zeroed();
    inode.init_dir(0o755, now);
    inode.set_links_count(links);
    inode.set_size(BLOCK_SIZE as u32);
    inode.set_blocks(BLOCK_SIZE as u32 / 512);
    inode.set_block(0, block);
    inode
}

fn put_inode(buf: &mut [u8], lay: &FsLayout, ino: u32, inode: &Inode) {
    let off = lay.inode_table as usize * BLOCK_SIZE + (ino - 1) as usize * INODE_SIZE;
    buf[off..off + INODE_SIZE].copy_from_slice(&inode.data);
}

/// Builds a fresh single-group image in memory: root directory with
/// `lost+found`, inodes 1-11 reserved.
pub fn mkfs(params: &MkfsParams) -> Result<(DiskImage, MkfsReport), MkfsError> {
    let lay = FsLayout::compute(params)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);

    log::debug!(
        "[mkfs] {} blocks, {} inodes, inode table {}+{}",
        lay.total_blocks,
        lay.total_inodes,
        lay.inode_table,
        lay.inode_table_blocks
    );

    let mut buf = vec![0u8; lay.total_blocks as usize * BLOCK_SIZE];

    {
        let bb = block_at(&mut buf, lay.block_bitmap);
        bitmap_set_range(bb, 0, lay.lost_found_block - lay.first_data_block);
        bitmap_mark_unused_tail(bb, lay.block_bits());
    }
    {
        let ib = block_at(&mut buf, lay.inode_bitmap);
        bitmap_set_range(ib, 0, EXT2_FIRST_INO_OLD - 1);
        bitmap_mark_unused_tail(ib, lay.total_inodes);
    }

    {
        let dir = block_at(&mut buf, lay.root_block);
        write_record(dir, 0, EXT2_ROOT_INO, 12, b".", FT_DIR);
        write_record(dir, 12, EXT2_ROOT_INO, 12, b"..", FT_DIR);
        write_record(dir, 24, EXT2_FIRST_INO_OLD, BLOCK_SIZE - 24, b"lost+found", FT_DIR);
    }
    {
        let dir = block_at(&mut buf, lay.lost_found_block);
        write_record(dir, 0, EXT2_FIRST_INO_OLD, 12, b".", FT_DIR);
        write_record(dir, 12, EXT2_ROOT_INO, BLOCK_SIZE - 12, b"..", FT_DIR);
    }
    put_inode(&mut buf, &lay, EXT2_ROOT_INO, &dir_inode(3, lay.root_block, now));
    put_inode(
        &mut buf,
        &lay,
        EXT2_FIRST_INO_OLD,
        &dir_inode(2, lay.lost_found_block, now),
    );

    let mut gd = GroupDesc::zeroed();
    gd.put_u32(gd_off::BLOCK_BITMAP, lay.block_bitmap);
    gd.put_u32(gd_off::INODE_BITMAP, lay.inode_bitmap);
    gd.put_u32(gd_off::INODE_TABLE, lay.inode_table);
    gd.set_free_blocks(lay.free_blocks as u16);
    gd.set_free_inodes(lay.free_inodes as u16);
    gd.put_u16(gd_off::USED_DIRS, 2);
    block_at(&mut buf, lay.gdt_block)[..GROUP_DESC_SIZE].copy_from_slice(&gd.data);

    let uuid = make_uuid(now);
    let mut sb = Superblock::zeroed();
    for (off, val) in [
        (sb_off::INODES_COUNT, lay.total_inodes),
        (sb_off::BLOCKS_COUNT, lay.total_blocks),
        (sb_off::R_BLOCKS_COUNT, lay.reserved_blocks),
        (sb_off::FREE_BLOCKS, lay.free_blocks),
        (sb_off::FREE_INODES, lay.free_inodes),
        (sb_off::FIRST_DATA_BLOCK, lay.first_data_block),
        (sb_off::LOG_BLOCK_SIZE, 0),
        (sb_off::LOG_FRAG_SIZE, 0),
        (sb_off::BLOCKS_PER_GROUP, BLOCKS_PER_GROUP),
        (sb_off::FRAGS_PER_GROUP, BLOCKS_PER_GROUP),
        (sb_off::INODES_PER_GROUP, lay.total_inodes),
        (sb_off::WTIME, now),
        (sb_off::LASTCHECK, now),
        (sb_off::REV_LEVEL, EXT2_DYNAMIC_REV),
        (sb_off::FIRST_INO, EXT2_FIRST_INO_OLD),
        (sb_off::FEATURE_INCOMPAT, FEATURE_INCOMPAT_FILETYPE),
    ] {
        sb.put_u32(off, val);
    }
    sb.put_u16(sb_off::MAX_MNT_COUNT, 20);
    sb.put_u16(sb_off::MAGIC, EXT2_MAGIC);
    sb.put_u16(sb_off::STATE, EXT2_STATE_VALID);
    sb.put_u16(sb_off::ERRORS, EXT2_ERRORS_CONTINUE);
    sb.put_u16(sb_off::INODE_SIZE, INODE_SIZE as u16);
    sb.data[sb_off::UUID..sb_off::UUID + 16].copy_from_slice(&uuid);
    sb.data[sb_off::VOLUME_NAME..sb_off::VOLUME_NAME + LABEL_LEN].copy_from_slice(&params.label);
    buf[SUPERBLOCK_OFFSET..SUPERBLOCK_OFFSET + SUPERBLOCK_SIZE].copy_from_slice(&sb.data);

    log::info!(
        "[mkfs] done: {} blocks ({} free), {} inodes ({} free)",
        lay.total_blocks,
        lay.free_blocks,
        lay.total_inodes,
        lay.free_inodes
    );

    let report = MkfsReport {
        block_size:         BLOCK_SIZE as u32,
        inode_size:         INODE_SIZE as u32,
        total_blocks:       lay.total_blocks,
        total_inodes:       lay.total_inodes,
        inode_table_blocks: lay.inode_table_blocks,
        free_blocks:        lay.free_blocks,
        free_inodes:        lay.free_inodes,
    };
    Ok((DiskImage::from_bytes(buf), report))
}
