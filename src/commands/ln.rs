use super::{fail, CommandResult, ResultExt};
use crate::ext2::path::split_path;
use crate::ext2::structs::MAX_NAME;
use crate::ext2::{Ext2Error, Ext2Fs};

/// Links `dest` to `source`, as a hard link or, with `symlink`, as a
/// symbolic link whose target text is `source`.
pub fn ln(fs: &mut Ext2Fs, source: &str, dest: &str, symlink: bool) -> CommandResult<u32> {
    let src = match fs.resolve(source).at(source)? {
        Some(entry) => entry,
        None => return fail(source, Ext2Error::NotFound),
    };
    if src.is_dir() {
        return fail(source, Ext2Error::IsDirectory);
    }

    match fs.resolve(dest).at(dest)? {
        Some(existing) if existing.is_dir() => return fail(dest, Ext2Error::IsDirectory),
        Some(_) => return fail(dest, Ext2Error::AlreadyExists),
        None => {}
    }

    let mut comps = split_path(dest);
    let name = match comps.pop() {
        Some(name) => name,
        None => return fail(dest, Ext2Error::IsDirectory),
    };
    if name.len() > MAX_NAME {
        return fail(dest, Ext2Error::NameTooLong);
    }
    let parent = fs.parent_dir(&comps).at(dest)?;

    let ino = if symlink {
        fs.create_symlink(parent, name, source).at(dest)?
    } else {
        fs.hardlink(parent, name, src.inode, src.kind.dir_entry_type())
            .at(dest)?;
        src.inode
    };

    log::info!(
        "[ln] {} -> {} ({}, inode {})",
        dest,
        source,
        if symlink { "symbolic" } else { "hard" },
        ino
    );
    Ok(ino)
}
