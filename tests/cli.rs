use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use miku_ext2::cli::{self, exit_code};
use miku_ext2::commands::{ls, mkdir, rm};
use miku_ext2::ext2::{EEXIST, ENOENT};
use miku_ext2::mkfs::{mkfs, MkfsParams};
use miku_ext2::Ext2Fs;
use tempfile::TempDir;

fn image_file(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("disk.img");
    let (image, _) = mkfs(&MkfsParams::default()).unwrap();
    image.save_as(&path).unwrap();
    path
}

fn reopen(path: &Path) -> Ext2Fs {
    Ext2Fs::open(path).unwrap()
}

#[test]
fn successful_command_is_saved() {
    let dir = tempfile::tempdir().unwrap();
    let path = image_file(&dir);

    let code = cli::run("ext2_mkdir", &path, |fs| mkdir(fs, "/saved").map(|_| ()));
    assert_eq!(code, ExitCode::SUCCESS);

    let fs = reopen(&path);
    assert_eq!(ls(&fs, "/", false).unwrap(), vec!["lost+found", "saved"]);
}

#[test]
fn failed_command_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = image_file(&dir);
    let before = fs::read(&path).unwrap();

    let code = cli::run("ext2_rm", &path, |fs| rm(fs, "/missing"));
    assert_eq!(code, exit_code(ENOENT));
    assert_eq!(fs::read(&path).unwrap(), before);

    let code = cli::run("ext2_mkdir", &path, |fs| mkdir(fs, "/lost+found").map(|_| ()));
    assert_eq!(code, exit_code(EEXIST));
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn inspect_never_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = image_file(&dir);
    let before = fs::read(&path).unwrap();

    let code = cli::inspect("ext2_ls", &path, |fs| ls(fs, "/", true).map(|_| ()));
    assert_eq!(code, ExitCode::SUCCESS);
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn unreadable_image_reports_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.img");
    let code = cli::inspect("ext2_ls", &missing, |_| Ok(()));
    assert_ne!(code, ExitCode::SUCCESS);

    let junk = dir.path().join("junk.img");
    fs::write(&junk, vec![0u8; 64 * 1024]).unwrap();
    let code = cli::run("ext2_mkdir", &junk, |fs| mkdir(fs, "/x").map(|_| ()));
    assert_ne!(code, ExitCode::SUCCESS);
    assert!(fs::read(&junk).unwrap().iter().all(|&b| b == 0));
}
