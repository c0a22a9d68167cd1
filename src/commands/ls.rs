use super::{fail, CommandResult, ResultExt};
use crate::ext2::{Ext2Error, Ext2Fs};

/// Names to print for `path`: the leaf for a file or link, the live
/// entries for a directory. `.` and `..` only show with `show_dots`.
pub fn ls(fs: &Ext2Fs, path: &str, show_dots: bool) -> CommandResult<Vec<String>> {
    let entry = match fs.resolve(path).at(path)? {
        Some(entry) => entry,
        None => return fail(path, Ext2Error::NotFound),
    };

    if !entry.is_dir() {
        return Ok(vec![entry.name]);
    }

    let dir = fs.read_inode(entry.inode).at(path)?;
    let names = fs
        .read_dir(&dir)
        .at(path)?
        .into_iter()
        .filter(|e| show_dots || !e.is_dot_or_dotdot())
        .map(|e| e.name_str().into_owned())
        .collect();
    Ok(names)
}
