use std::fmt;

use super::bitmap::{count_free, is_used};
use super::dir::iterate;
use super::structs::*;
use super::{Ext2Error, Ext2Fs};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsckIssue {
    FreeBlocksMismatch { superblock: u32, group: u32, bitmap: u32 },
    FreeInodesMismatch { superblock: u32, group: u32, bitmap: u32 },
    UsedDirsMismatch { recorded: u16, found: u32 },
    LeakedBlock(u32),
    UnmarkedBlock(u32),
    LeakedInode(u32),
    UnmarkedInode(u32),
    BadBlockPointer { inode: u32, block: u32 },
    BadEntry { dir: u32, inode: u32 },
    BadRecordChain { dir: u32, block: u32 },
    LinkCount { inode: u32, expected: u32, found: u16 },
}

impl fmt::Display for FsckIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsckIssue::FreeBlocksMismatch { superblock, group, bitmap } => write!(
                f,
                "free blocks: superblock {}, group {}, bitmap {}",
                superblock, group, bitmap
            ),
            FsckIssue::FreeInodesMismatch { superblock, group, bitmap } => write!(
                f,
                "free inodes: superblock {}, group {}, bitmap {}",
                superblock, group, bitmap
            ),
            FsckIssue::UsedDirsMismatch { recorded, found } => {
                write!(f, "used dirs: recorded {}, found {}", recorded, found)
            }
            FsckIssue::LeakedBlock(b) => write!(f, "block {} marked used but unreachable", b),
            FsckIssue::UnmarkedBlock(b) => write!(f, "block {} in use but marked free", b),
            FsckIssue::LeakedInode(i) => write!(f, "inode {} marked used but unreachable", i),
            FsckIssue::UnmarkedInode(i) => write!(f, "inode {} in use but marked free", i),
            FsckIssue::BadBlockPointer { inode, block } => {
                write!(f, "inode {} points at block {} outside the data area", inode, block)
            }
            FsckIssue::BadEntry { dir, inode } => {
                write!(f, "dir {} has an entry for invalid inode {}", dir, inode)
            }
            FsckIssue::BadRecordChain { dir, block } => {
                write!(f, "dir {} block {}: record lengths do not cover the block", dir, block)
            }
            FsckIssue::LinkCount { inode, expected, found } => write!(
                f,
                "inode {} link count {} (expected {})",
                inode, found, expected
            ),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FsckReport {
    pub issues: Vec<FsckIssue>,
    pub inodes_seen: u32,
    pub blocks_seen: u32,
    pub directories: u32,
}

impl FsckReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Read-only consistency pass over the whole image.
pub fn check(fs: &Ext2Fs) -> Result<FsckReport, Ext2Error> {
    let mut report = FsckReport::default();
    let inodes_count = fs.inodes_count();
    let blocks_count = fs.blocks_count();
    let data_zone = fs.first_data_zone();
    let first_data = fs.superblock.first_data_block();

    let mut inode_seen = vec![false; inodes_count as usize + 1];
    let mut block_seen = vec![false; blocks_count as usize];
    let mut refs = vec![0u32; inodes_count as usize + 1];
    let mut subdirs = vec![0u32; inodes_count as usize + 1];
    let mut is_dir = vec![false; inodes_count as usize + 1];

    let mut queue = vec![EXT2_ROOT_INO];
    inode_seen[EXT2_ROOT_INO as usize] = true;

    while let Some(ino) = queue.pop() {
        let inode = fs.read_inode(ino)?;

        let mut owned = Vec::new();
        let indirect = inode.block(EXT2_IND_BLOCK);
        if indirect != 0 {
            owned.push(indirect);
        }
        let blocks = if indirect == 0 || indirect < blocks_count {
            fs.occupied_blocks(&inode)?
        } else {
            (0..EXT2_NDIR_BLOCKS)
                .filter(|&i| inode.block(i) != 0)
                .map(|i| (i as u32, inode.block(i)))
                .collect()
        };
        owned.extend(blocks.iter().map(|&(_, b)| b));

        for blk in owned {
            if blk < data_zone || blk >= blocks_count {
                report.issues.push(FsckIssue::BadBlockPointer { inode: ino, block: blk });
                continue;
            }
            block_seen[blk as usize] = true;
        }

        if !inode.is_directory() {
            continue;
        }
        is_dir[ino as usize] = true;
        report.directories += 1;

        for (_, phys) in blocks {
            if phys < data_zone || phys >= blocks_count {
                continue;
            }
            let block = fs.block(phys)?;
            let covered: usize = iterate(block).map(|r| r.rec_len).sum();
            if covered != block.len() {
                report.issues.push(FsckIssue::BadRecordChain { dir: ino, block: phys });
            }

            for rec in iterate(block).filter(|r| r.is_live()) {
                if rec.name == b"." || rec.name == b".." {
                    continue;
                }
                let child = rec.inode;
                if child > inodes_count {
                    report.issues.push(FsckIssue::BadEntry { dir: ino, inode: child });
                    continue;
                }
                refs[child as usize] += 1;
                if fs.entry_kind(rec.file_type, child)? == InodeType::Directory {
                    subdirs[ino as usize] += 1;
                }
                if !inode_seen[child as usize] {
                    inode_seen[child as usize] = true;
                    queue.push(child);
                }
            }
        }
    }

    let block_bitmap = fs.block_bitmap()?;
    let inode_bitmap = fs.inode_bitmap()?;

    let bitmap_free_blocks = count_free(block_bitmap, blocks_count - first_data);
    if bitmap_free_blocks != fs.superblock.free_blocks_count()
        || bitmap_free_blocks != fs.group.free_blocks() as u32
    {
        report.issues.push(FsckIssue::FreeBlocksMismatch {
            superblock: fs.superblock.free_blocks_count(),
            group: fs.group.free_blocks() as u32,
            bitmap: bitmap_free_blocks,
        });
    }

    let bitmap_free_inodes = count_free(inode_bitmap, inodes_count);
    if bitmap_free_inodes != fs.superblock.free_inodes_count()
        || bitmap_free_inodes != fs.group.free_inodes() as u32
    {
        report.issues.push(FsckIssue::FreeInodesMismatch {
            superblock: fs.superblock.free_inodes_count(),
            group: fs.group.free_inodes() as u32,
            bitmap: bitmap_free_inodes,
        });
    }

    if report.directories != fs.group.used_dirs() as u32 {
        report.issues.push(FsckIssue::UsedDirsMismatch {
            recorded: fs.group.used_dirs(),
            found: report.directories,
        });
    }

    for blk in data_zone..blocks_count {
        let used = is_used(block_bitmap, blk - first_data);
        let seen = block_seen[blk as usize];
        if seen {
            report.blocks_seen += 1;
        }
        match (used, seen) {
            (true, false) => report.issues.push(FsckIssue::LeakedBlock(blk)),
            (false, true) => report.issues.push(FsckIssue::UnmarkedBlock(blk)),
            _ => {}
        }
    }

    let first_ino = fs.superblock.first_ino();
    for ino in 1..=inodes_count {
        let used = is_used(inode_bitmap, ino - 1);
        let seen = inode_seen[ino as usize];
        if seen {
            report.inodes_seen += 1;
        }
        if seen && !used {
            report.issues.push(FsckIssue::UnmarkedInode(ino));
        }
        if used && !seen && ino >= first_ino {
            report.issues.push(FsckIssue::LeakedInode(ino));
        }
        if !seen {
            continue;
        }

        let found = fs.read_inode(ino)?.links_count();
        let expected = if is_dir[ino as usize] {
            2 + subdirs[ino as usize]
        } else {
            refs[ino as usize]
        };
        if found as u32 != expected {
            report.issues.push(FsckIssue::LinkCount { inode: ino, expected, found });
        }
    }

    log::info!(
        "[fsck] {} inodes, {} blocks, {} dirs, {} issues",
        report.inodes_seen,
        report.blocks_seen,
        report.directories,
        report.issues.len()
    );
    Ok(report)
}
