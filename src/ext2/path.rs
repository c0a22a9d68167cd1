use super::structs::*;
use super::{Ext2Error, Ext2Fs};

/// Path components with empty pieces dropped, so `//a/b/` gives `[a, b]`.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub inode: u32,
    pub kind: InodeType,
    pub file_type: u8,
    pub name: String,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == InodeType::Directory
    }
}

impl Ext2Fs {
    /// Type of an entry from its tag, or from the inode when the tag is
    /// missing.
    pub fn entry_kind(&self, file_type: u8, inode_num: u32) -> Result<InodeType, Ext2Error> {
        match InodeType::from_dir_entry_type(file_type) {
            InodeType::Unknown => Ok(self.read_inode(inode_num)?.file_type()),
            kind => Ok(kind),
        }
    }

    pub fn lookup_in_dir(&self, dir_ino: u32, name: &str) -> Result<Option<Entry>, Ext2Error> {
        let dir = self.read_inode(dir_ino)?;
        let slot = match self.find_in_inode(&dir, name.as_bytes())? {
            Some(slot) => slot,
            None => return Ok(None),
        };
        Ok(Some(Entry {
            inode: slot.inode,
            kind: self.entry_kind(slot.file_type, slot.inode)?,
            file_type: slot.file_type,
            name: name.to_string(),
        }))
    }

    /// Walks `components` from the root.
    ///
    /// The walk begins with the root's own `.` entry, so an empty list
    /// resolves to the root. Any component reached through a non-directory
    /// ends the walk with `None`.
    pub fn traverse(&self, components: &[&str]) -> Result<Option<Entry>, Ext2Error> {
        let mut cur = match self.lookup_in_dir(EXT2_ROOT_INO, ".")? {
            Some(entry) => entry,
            None => return Err(Ext2Error::Corrupted("root directory has no '.' entry")),
        };

        for comp in components {
            if !cur.is_dir() {
                return Ok(None);
            }
            cur = match self.lookup_in_dir(cur.inode, comp)? {
                Some(entry) => entry,
                None => return Ok(None),
            };
        }
        Ok(Some(cur))
    }

    pub fn resolve(&self, path: &str) -> Result<Option<Entry>, Ext2Error> {
        self.traverse(&split_path(path))
    }

    /// Inode number of the directory named by `components`.
    pub fn parent_dir(&self, components: &[&str]) -> Result<u32, Ext2Error> {
        let parent = self.traverse(components)?.ok_or(Ext2Error::NotFound)?;
        if !parent.is_dir() {
            return Err(Ext2Error::NotDirectory);
        }
        Ok(parent.inode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext2::testutil::fresh_fs;

    #[test]
    fn split_drops_empty_pieces() {
        assert_eq!(split_path("/a//b/"), vec!["a", "b"]);
        assert!(split_path("/").is_empty());
        assert!(split_path("").is_empty());
    }

    #[test]
    fn slash_is_the_root_dot_entry() {
        let fs = fresh_fs();
        let root = fs.resolve("/").unwrap().unwrap();
        assert_eq!(root.inode, EXT2_ROOT_INO);
        assert_eq!(root.name, ".");
        assert!(root.is_dir());
    }

    #[test]
    fn resolves_lost_and_found() {
        let fs = fresh_fs();
        let lf = fs.resolve("/lost+found").unwrap().unwrap();
        assert_eq!(lf.inode, 11);
        assert!(lf.is_dir());
        assert_eq!(fs.resolve("/lost+found/..").unwrap().unwrap().inode, EXT2_ROOT_INO);
        assert!(fs.resolve("/missing").unwrap().is_none());
    }

    #[test]
    fn walk_through_file_fails() {
        let mut fs = fresh_fs();
        let ino = fs.allocate_inode().unwrap();
        let mut inode = Inode::zeroed();
        inode.init_file(0o644, 1);
        fs.write_inode(ino, &inode).unwrap();
        fs.add_dir_entry(EXT2_ROOT_INO, "f", ino, FT_REG_FILE).unwrap();

        assert_eq!(fs.resolve("/f").unwrap().unwrap().kind, InodeType::Regular);
        assert!(fs.resolve("/f/x").unwrap().is_none());
        assert!(matches!(fs.parent_dir(&["f"]), Err(Ext2Error::NotDirectory)));
        assert!(matches!(fs.parent_dir(&["nope"]), Err(Ext2Error::NotFound)));
    }

    #[test]
    fn unknown_tag_falls_back_to_inode_mode() {
        let mut fs = fresh_fs();
        fs.add_dir_entry(EXT2_ROOT_INO, "alias", 11, FT_UNKNOWN).unwrap();
        let entry = fs.resolve("/alias").unwrap().unwrap();
        assert_eq!(entry.file_type, FT_UNKNOWN);
        assert_eq!(entry.kind, InodeType::Directory);
    }
}
