use super::{fail, CommandResult, ResultExt};
use crate::ext2::path::split_path;
use crate::ext2::structs::MAX_NAME;
use crate::ext2::write::DEFAULT_DIR_MODE;
use crate::ext2::{Ext2Error, Ext2Fs};

/// Creates the directory at `path` and returns its inode number.
pub fn mkdir(fs: &mut Ext2Fs, path: &str) -> CommandResult<u32> {
    let mut comps = split_path(path);
    let name = match comps.pop() {
        Some(name) => name,
        None => return fail(path, Ext2Error::AlreadyExists),
    };
    if name.len() > MAX_NAME {
        return fail(path, Ext2Error::NameTooLong);
    }

    let parent = fs.parent_dir(&comps).at(path)?;
    if fs.lookup_in_dir(parent, name).at(path)?.is_some() {
        return fail(path, Ext2Error::AlreadyExists);
    }

    let ino = fs.create_dir(parent, name, DEFAULT_DIR_MODE).at(path)?;
    log::info!("[mkdir] {} -> inode {}", path, ino);
    Ok(ino)
}
