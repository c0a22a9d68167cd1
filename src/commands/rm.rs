use super::{fail, CommandResult, ResultExt};
use crate::ext2::path::split_path;
use crate::ext2::{Ext2Error, Ext2Fs};

/// Removes one name of a file or symlink. Directories are refused.
pub fn rm(fs: &mut Ext2Fs, path: &str) -> CommandResult<()> {
    let mut comps = split_path(path);
    let entry = match fs.traverse(&comps).at(path)? {
        Some(entry) => entry,
        None => return fail(path, Ext2Error::NotFound),
    };
    if entry.is_dir() {
        return fail(path, Ext2Error::IsDirectory);
    }

    // only the root has no components, and it is a directory
    let name = match comps.pop() {
        Some(name) => name,
        None => return fail(path, Ext2Error::IsDirectory),
    };
    let parent = fs.parent_dir(&comps).at(path)?;
    fs.unlink(parent, name).at(path)?;

    log::info!("[rm] {} (inode {})", path, entry.inode);
    Ok(())
}
