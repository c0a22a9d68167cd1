use std::fs;
use std::io;
use std::path::Path;

use super::{fail, CommandResult, ResultExt};
use crate::ext2::path::split_path;
use crate::ext2::structs::{InodeType, MAX_NAME};
use crate::ext2::{Ext2Error, Ext2Fs};

fn host_error(err: io::Error) -> Ext2Error {
    match err.kind() {
        io::ErrorKind::NotFound => Ext2Error::NotFound,
        _ => Ext2Error::Io(err),
    }
}

fn read_host_file(path: &Path) -> Result<Vec<u8>, Ext2Error> {
    let meta = fs::metadata(path).map_err(host_error)?;
    if meta.is_dir() {
        return Err(Ext2Error::IsDirectory);
    }
    fs::read(path).map_err(host_error)
}

/// Copies a host file into the image. A destination that names a directory
/// receives the file under the source's base name; an existing regular file
/// is overwritten in place. Returns the inode written.
pub fn cp(fs: &mut Ext2Fs, source: &Path, dest: &str) -> CommandResult<u32> {
    let host = source.display().to_string();
    let meta = fs::metadata(source).map_err(host_error).at(&host)?;
    if meta.is_dir() {
        return fail(&host, Ext2Error::IsDirectory);
    }
    fs.blocks_for_len(meta.len()).at(&host)?;

    let mut comps = split_path(dest);
    if let Some(existing) = fs.traverse(&comps).at(dest)? {
        if existing.is_dir() {
            let base = match source.file_name().and_then(|n| n.to_str()) {
                Some(base) => base,
                None => return fail(&host, Ext2Error::InvalidPath),
            };
            comps.push(base);
        }
    }
    let target = format!("/{}", comps.join("/"));

    let name = match comps.pop() {
        Some(name) => name,
        None => return fail(&target, Ext2Error::IsDirectory),
    };
    if name.len() > MAX_NAME {
        return fail(&target, Ext2Error::NameTooLong);
    }
    let parent = fs.parent_dir(&comps).at(&target)?;

    let existing = fs.lookup_in_dir(parent, name).at(&target)?;
    if let Some(entry) = &existing {
        match entry.kind {
            InodeType::Directory => return fail(&target, Ext2Error::IsDirectory),
            InodeType::Regular => {}
            _ => return fail(&target, Ext2Error::AlreadyExists),
        }
    }

    let data = read_host_file(source).at(&host)?;
    let ino = match existing {
        Some(entry) => {
            fs.overwrite_file(entry.inode, &data).at(&target)?;
            entry.inode
        }
        None => fs.create_file(parent, name, &data).at(&target)?,
    };

    log::info!("[cp] {} -> {} ({} bytes, inode {})", host, target, data.len(), ino);
    Ok(ino)
}
